//! Registration code service.
//!
//! [`CodeService`] is the single entry point for issuing, validating,
//! redeeming, listing, exporting and deleting codes. It holds no cache; every
//! call goes through to the injected [`CodeStore`].

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::models::code::{
    non_blank, normalize_code, Code, CodeFilter, CodeStats, CodeValidation, GenerateCodesRequest,
    NewCode, Redemption, ValidationMessages, DEFAULT_ROLE, MAX_BATCH_LIMIT, MAX_USES_LIMIT,
};
use crate::models::export::{CodeExport, ExportError};
use crate::services::code_generator::{CodeGenerator, DEFAULT_CODE_LENGTH};
use crate::services::code_store::{CodeStore, StoreError};
use shared::pagination::{Page, PageRequest};

/// Error type for code service operations.
#[derive(Debug, Error)]
pub enum CodeServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Export(#[from] ExportError),
}

/// Tunables for code issuing and listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeSettings {
    /// Length of the random part of generated codes.
    pub length: usize,
    /// Optional prefix prepended to every generated code.
    pub prefix: Option<String>,
    /// Random candidates tried per code before it is skipped.
    pub max_generation_attempts: u32,
    /// Role granted when a request does not name one.
    pub default_role: String,
    pub max_batch_size: u32,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_export_rows: u32,
}

impl Default for CodeSettings {
    fn default() -> Self {
        Self {
            length: DEFAULT_CODE_LENGTH,
            prefix: None,
            max_generation_attempts: 20,
            default_role: DEFAULT_ROLE.to_string(),
            max_batch_size: MAX_BATCH_LIMIT,
            default_page_size: 50,
            max_page_size: 200,
            max_export_rows: 10_000,
        }
    }
}

/// Registration code service.
pub struct CodeService {
    store: Arc<dyn CodeStore>,
    generator: CodeGenerator,
    settings: CodeSettings,
    messages: ValidationMessages,
}

impl CodeService {
    pub fn new(
        store: Arc<dyn CodeStore>,
        settings: CodeSettings,
        messages: ValidationMessages,
    ) -> Self {
        let generator = CodeGenerator::new(settings.length, settings.prefix.as_deref());
        Self {
            store,
            generator,
            settings,
            messages,
        }
    }

    pub fn messages(&self) -> &ValidationMessages {
        &self.messages
    }

    /// Resolve a caller's page request against the configured page sizes.
    pub fn normalize_page(&self, request: PageRequest) -> Page {
        request.normalize(self.settings.default_page_size, self.settings.max_page_size)
    }

    /// Generate a batch of unique codes.
    ///
    /// Each code gets up to `max_generation_attempts` random candidates. A
    /// code whose candidates all collide is skipped, so the result may hold
    /// fewer codes than requested. Storage failures abort the batch.
    pub async fn generate_codes(
        &self,
        request: &GenerateCodesRequest,
    ) -> Result<Vec<Code>, CodeServiceError> {
        request
            .validate()
            .map_err(|e| CodeServiceError::InvalidInput(e.to_string()))?;

        if request.count > self.settings.max_batch_size {
            return Err(CodeServiceError::InvalidInput(format!(
                "count must not exceed {}",
                self.settings.max_batch_size
            )));
        }

        let max_uses = request.max_uses.unwrap_or(1);
        if !(1..=MAX_USES_LIMIT).contains(&max_uses) {
            return Err(CodeServiceError::InvalidInput(format!(
                "max_uses must be between 1 and {MAX_USES_LIMIT}"
            )));
        }

        let role = non_blank(request.role.as_deref())
            .unwrap_or_else(|| self.settings.default_role.clone());
        let group_name = non_blank(request.group_name.as_deref());

        let mut created = Vec::with_capacity(request.count as usize);
        let mut skipped = 0u32;

        for _ in 0..request.count {
            let mut inserted = None;
            for _ in 0..self.settings.max_generation_attempts {
                let candidate = NewCode {
                    code: self.generator.generate(),
                    role: role.clone(),
                    group_name: group_name.clone(),
                    course_id: request.course_id,
                    max_uses,
                    expiry_date: request.expiry_date,
                    created_by: request.issuer_id,
                };
                if let Some(code) = self.store.insert(&candidate).await? {
                    inserted = Some(code);
                    break;
                }
            }

            match inserted {
                Some(code) => created.push(code),
                None => {
                    skipped += 1;
                    tracing::warn!(
                        attempts = self.settings.max_generation_attempts,
                        keyspace = self.generator.keyspace(),
                        "Could not generate a unique registration code, skipping"
                    );
                }
            }
        }

        tracing::info!(
            requested = request.count,
            created = created.len(),
            skipped = skipped,
            role = %role,
            group_name = ?group_name,
            course_id = ?request.course_id,
            "Generated registration codes"
        );

        Ok(created)
    }

    /// Look up a code. Input is trimmed and uppercased first.
    pub async fn find_code(&self, code: &str) -> Result<Option<Code>, CodeServiceError> {
        let normalized = normalize_code(code);
        if normalized.is_empty() {
            return Ok(None);
        }
        Ok(self.store.find_by_code(&normalized).await?)
    }

    /// Validate a code string. Unknown codes yield a not-found result.
    pub async fn validate_code(&self, code: &str) -> Result<CodeValidation, CodeServiceError> {
        Ok(match self.find_code(code).await? {
            Some(found) => found.validate(&self.messages),
            None => CodeValidation::not_found(&self.messages),
        })
    }

    /// Record one redemption of `code` by `user_id`.
    ///
    /// Returns `Ok(false)` when the code does not exist, is no longer valid,
    /// or a concurrent redemption took its last use.
    pub async fn mark_code_used(&self, code: &str, user_id: i64) -> Result<bool, CodeServiceError> {
        let Some(mut found) = self.find_code(code).await? else {
            return Ok(false);
        };
        Ok(found.mark_as_used(self.store.as_ref(), user_id).await?)
    }

    /// Validate and redeem in one call, reporting why a redemption failed.
    pub async fn redeem_code(
        &self,
        code: &str,
        user_id: i64,
    ) -> Result<Redemption, CodeServiceError> {
        let Some(mut found) = self.find_code(code).await? else {
            return Ok(Redemption {
                redeemed: false,
                validation: CodeValidation::not_found(&self.messages),
                code: None,
            });
        };

        let validation = found.validate(&self.messages);
        if !validation.valid {
            return Ok(Redemption {
                redeemed: false,
                validation,
                code: Some(found),
            });
        }

        if found.mark_as_used(self.store.as_ref(), user_id).await? {
            tracing::info!(
                code_id = found.id(),
                user_id = user_id,
                used_count = found.used_count(),
                "Registration code redeemed"
            );
            return Ok(Redemption {
                redeemed: true,
                validation,
                code: Some(found),
            });
        }

        // Lost a race: report the state that beat us.
        let current = self.store.find_by_code(found.code()).await?;
        let validation = match &current {
            Some(c) => c.validate(&self.messages),
            None => CodeValidation::not_found(&self.messages),
        };
        Ok(Redemption {
            redeemed: false,
            validation,
            code: current,
        })
    }

    /// List codes matching `filter`, newest first unless the filter asks
    /// otherwise.
    pub async fn get_codes(
        &self,
        filter: &CodeFilter,
        page: PageRequest,
    ) -> Result<Vec<Code>, CodeServiceError> {
        let page = self.normalize_page(page);
        Ok(self.store.list(filter, page).await?)
    }

    pub async fn count_codes(&self, filter: &CodeFilter) -> Result<i64, CodeServiceError> {
        Ok(self.store.count(filter).await?)
    }

    pub async fn code_stats(&self, filter: &CodeFilter) -> Result<CodeStats, CodeServiceError> {
        Ok(self.store.stats(filter, Utc::now()).await?)
    }

    /// Delete a code by id. Returns false if it did not exist.
    pub async fn delete_code(&self, id: i64) -> Result<bool, CodeServiceError> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            tracing::info!(code_id = id, "Registration code deleted");
        }
        Ok(deleted)
    }

    /// Delete several codes by id. Returns the number actually deleted.
    pub async fn delete_codes(&self, ids: &[i64]) -> Result<u64, CodeServiceError> {
        let unique: Vec<i64> = ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if unique.is_empty() {
            return Ok(0);
        }
        if unique.len() > self.settings.max_batch_size as usize {
            return Err(CodeServiceError::InvalidInput(format!(
                "at most {} ids can be deleted at once",
                self.settings.max_batch_size
            )));
        }

        let deleted = self.store.delete_many(&unique).await?;
        tracing::info!(
            requested = unique.len(),
            deleted = deleted,
            "Registration codes deleted"
        );
        Ok(deleted)
    }

    /// Render codes matching `filter` in the selected export format, up to
    /// `max_export_rows` rows.
    pub async fn export_codes(
        &self,
        filter: &CodeFilter,
        export: &CodeExport,
    ) -> Result<String, CodeServiceError> {
        let codes = self
            .store
            .list(filter, Page::all(self.settings.max_export_rows))
            .await?;
        Ok(export.render(&codes)?)
    }

    /// Check that the store is reachable.
    pub async fn ping(&self) -> Result<(), CodeServiceError> {
        Ok(self.store.ping().await?)
    }
}
