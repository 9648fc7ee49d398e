//! Registration code domain model.
//!
//! A [`Code`] is one issued registration/promo string. It may be bound to a
//! role, a class/group and a course, carries a usage cap and an optional
//! expiry date, and records the last redemption.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::services::code_store::{CodeStore, StoreError};
use shared::pagination::PageRequest;

/// Role granted when the issuer does not name one.
pub const DEFAULT_ROLE: &str = "subscriber";

/// Upper bound for `max_uses` accepted from callers.
pub const MAX_USES_LIMIT: i32 = 100_000;

/// Upper bound for a single generation batch accepted from callers.
pub const MAX_BATCH_LIMIT: u32 = 1000;

/// Registration code domain model.
///
/// `code`, `created_by` and `created_at` are fixed at creation; the usage
/// fields only change through a redemption, which always writes `used_count`
/// and `is_used` together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Code {
    pub(crate) id: i64,
    pub(crate) code: String,
    pub(crate) role: String,
    pub(crate) group_name: Option<String>,
    pub(crate) course_id: Option<i64>,
    pub(crate) max_uses: i32,
    pub(crate) used_count: i32,
    pub(crate) is_used: bool,
    pub(crate) used_by: Option<i64>,
    pub(crate) used_at: Option<DateTime<Utc>>,
    pub(crate) expiry_date: Option<DateTime<Utc>>,
    pub(crate) created_by: Option<i64>,
    pub(crate) created_at: DateTime<Utc>,
}

/// Raw column values of one stored code, used by storage backends to
/// rebuild a [`Code`].
#[derive(Debug, Clone, PartialEq)]
pub struct CodeRecord {
    pub id: i64,
    pub code: String,
    pub role: String,
    pub group_name: Option<String>,
    pub course_id: Option<i64>,
    pub max_uses: i32,
    pub used_count: i32,
    pub is_used: bool,
    pub used_by: Option<i64>,
    pub used_at: Option<DateTime<Utc>>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<CodeRecord> for Code {
    fn from(record: CodeRecord) -> Self {
        Code {
            id: record.id,
            code: record.code,
            role: record.role,
            group_name: record.group_name,
            course_id: record.course_id,
            max_uses: record.max_uses,
            used_count: record.used_count,
            is_used: record.is_used,
            used_by: record.used_by,
            used_at: record.used_at,
            expiry_date: record.expiry_date,
            created_by: record.created_by,
            created_at: record.created_at,
        }
    }
}

impl Code {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn group_name(&self) -> Option<&str> {
        self.group_name.as_deref()
    }

    pub fn course_id(&self) -> Option<i64> {
        self.course_id
    }

    pub fn max_uses(&self) -> i32 {
        self.max_uses
    }

    pub fn used_count(&self) -> i32 {
        self.used_count
    }

    pub fn is_used(&self) -> bool {
        self.is_used
    }

    pub fn used_by(&self) -> Option<i64> {
        self.used_by
    }

    pub fn used_at(&self) -> Option<DateTime<Utc>> {
        self.used_at
    }

    pub fn expiry_date(&self) -> Option<DateTime<Utc>> {
        self.expiry_date
    }

    pub fn created_by(&self) -> Option<i64> {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Check if the code has reached its usage limit.
    pub fn is_exhausted(&self) -> bool {
        self.used_count >= self.max_uses
    }

    /// Remaining redemptions before the code is exhausted.
    pub fn remaining_uses(&self) -> i32 {
        (self.max_uses - self.used_count).max(0)
    }

    /// Check if the code is past its expiry date at `now`.
    ///
    /// A code expiring exactly at `now` is still valid.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry < now)
    }

    /// Check if the code can be redeemed at `now`.
    pub fn is_redeemable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired_at(now) && !self.is_exhausted()
    }

    /// Validate the code against the current time.
    pub fn validate(&self, messages: &ValidationMessages) -> CodeValidation {
        self.validate_at(Utc::now(), messages)
    }

    /// Validate the code against `now`.
    ///
    /// Expiry is checked first: an expired code reports as expired whatever
    /// its usage count.
    pub fn validate_at(&self, now: DateTime<Utc>, messages: &ValidationMessages) -> CodeValidation {
        if self.is_expired_at(now) {
            return CodeValidation::invalid(InvalidReason::Expired, messages);
        }
        if self.is_exhausted() {
            return CodeValidation::invalid(InvalidReason::AlreadyUsed, messages);
        }
        CodeValidation::valid(messages)
    }

    /// Record one redemption by `redeemer_id`.
    ///
    /// Re-validates, then asks the store for an atomic conditional
    /// increment. On success `self` is refreshed from the stored row.
    /// Returns `Ok(false)` when the code is no longer redeemable, including
    /// when a concurrent redemption took the last use first.
    pub async fn mark_as_used(
        &mut self,
        store: &dyn CodeStore,
        redeemer_id: i64,
    ) -> Result<bool, StoreError> {
        let now = Utc::now();
        if !self.is_redeemable_at(now) {
            return Ok(false);
        }

        match store.redeem(&self.code, redeemer_id, now).await? {
            Some(updated) => {
                *self = updated;
                Ok(true)
            }
            None => {
                tracing::info!(
                    code_id = self.id,
                    redeemer_id = redeemer_id,
                    "Redemption lost a race or code became invalid"
                );
                Ok(false)
            }
        }
    }

    /// Apply one redemption in place. Storage backends that cannot express
    /// the conditional update in their query language call this under their
    /// own lock after checking [`Code::is_redeemable_at`].
    pub(crate) fn apply_redemption(&mut self, redeemer_id: i64, at: DateTime<Utc>) {
        self.used_count += 1;
        self.is_used = self.used_count >= self.max_uses;
        self.used_by = Some(redeemer_id);
        self.used_at = Some(at);
    }
}

/// Input for inserting a freshly generated code.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCode {
    pub code: String,
    pub role: String,
    pub group_name: Option<String>,
    pub course_id: Option<i64>,
    pub max_uses: i32,
    pub expiry_date: Option<DateTime<Utc>>,
    pub created_by: Option<i64>,
}

/// Why a code failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    NotFound,
    AlreadyUsed,
    Expired,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidReason::NotFound => write!(f, "not_found"),
            InvalidReason::AlreadyUsed => write!(f, "already_used"),
            InvalidReason::Expired => write!(f, "expired"),
        }
    }
}

/// Human-readable validation messages.
///
/// Loaded from configuration so deployments can localize them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationMessages {
    pub valid: String,
    pub not_found: String,
    pub already_used: String,
    pub expired: String,
    /// Generic failure shown to callers that must not learn the reason.
    pub invalid: String,
}

impl Default for ValidationMessages {
    fn default() -> Self {
        Self {
            valid: "Code is valid".to_string(),
            not_found: "Code does not exist".to_string(),
            already_used: "Code already used".to_string(),
            expired: "Code expired".to_string(),
            invalid: "Invalid registration code".to_string(),
        }
    }
}

impl ValidationMessages {
    pub fn for_reason(&self, reason: InvalidReason) -> &str {
        match reason {
            InvalidReason::NotFound => &self.not_found,
            InvalidReason::AlreadyUsed => &self.already_used,
            InvalidReason::Expired => &self.expired,
        }
    }
}

/// Result of validating a code string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeValidation {
    pub valid: bool,
    pub message: String,
    #[serde(skip)]
    pub reason: Option<InvalidReason>,
}

impl CodeValidation {
    pub fn valid(messages: &ValidationMessages) -> Self {
        Self {
            valid: true,
            message: messages.valid.clone(),
            reason: None,
        }
    }

    pub fn invalid(reason: InvalidReason, messages: &ValidationMessages) -> Self {
        Self {
            valid: false,
            message: messages.for_reason(reason).to_string(),
            reason: Some(reason),
        }
    }

    pub fn not_found(messages: &ValidationMessages) -> Self {
        Self::invalid(InvalidReason::NotFound, messages)
    }

    /// Replace the failure message with the generic one so the caller cannot
    /// tell a missing code from a used or expired one.
    pub fn redacted(mut self, messages: &ValidationMessages) -> Self {
        if !self.valid {
            self.message = messages.invalid.clone();
        }
        self
    }
}

/// Listing order. Defaults to newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
}

/// Filters for listing, counting and exporting codes. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CodeFilter {
    pub group_name: Option<String>,
    pub course_id: Option<i64>,
    pub is_used: Option<bool>,
    pub role: Option<String>,
    pub created_by: Option<i64>,
    #[serde(default)]
    pub order: SortOrder,
}

impl CodeFilter {
    pub fn by_group(group_name: impl Into<String>) -> Self {
        Self {
            group_name: Some(group_name.into()),
            ..Self::default()
        }
    }

    pub fn by_course(course_id: i64) -> Self {
        Self {
            course_id: Some(course_id),
            ..Self::default()
        }
    }

    /// Check whether a code passes every set filter. Group names match
    /// exactly.
    pub fn matches(&self, code: &Code) -> bool {
        if let Some(group_name) = &self.group_name {
            if code.group_name.as_deref() != Some(group_name.as_str()) {
                return false;
            }
        }
        if let Some(course_id) = self.course_id {
            if code.course_id != Some(course_id) {
                return false;
            }
        }
        if let Some(is_used) = self.is_used {
            if code.is_used != is_used {
                return false;
            }
        }
        if let Some(role) = &self.role {
            if &code.role != role {
                return false;
            }
        }
        if let Some(created_by) = self.created_by {
            if code.created_by != Some(created_by) {
                return false;
            }
        }
        true
    }
}

/// Aggregate counts over a filtered set of codes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CodeStats {
    pub total: i64,
    pub used: i64,
    pub unused: i64,
    /// Unused codes whose expiry date has passed.
    pub expired: i64,
    /// Sum of `used_count` across the set.
    pub redemptions: i64,
}

/// Request to generate a batch of codes.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct GenerateCodesRequest {
    #[validate(range(min = 1, max = 1000, message = "count must be between 1 and 1000"))]
    pub count: u32,

    /// Role to grant on redemption (default: subscriber).
    #[validate(custom(function = "validate_role_or_blank"))]
    pub role: Option<String>,

    /// Class/group the code is scoped to. Blank means unrestricted.
    #[validate(custom(function = "shared::validation::validate_group_name"))]
    pub group_name: Option<String>,

    #[validate(range(min = 1, message = "course_id must be positive"))]
    pub course_id: Option<i64>,

    /// Maximum redemptions (default: 1).
    #[validate(range(min = 1, max = 100000, message = "max_uses must be between 1 and 100000"))]
    pub max_uses: Option<i32>,

    pub expiry_date: Option<DateTime<Utc>>,

    /// Host-platform user id of the issuer.
    pub issuer_id: Option<i64>,
}

fn validate_role_or_blank(role: &str) -> Result<(), validator::ValidationError> {
    if role.trim().is_empty() {
        return Ok(());
    }
    shared::validation::validate_role(role.trim())
}

/// Request to validate a code string.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct ValidateCodeRequest {
    #[validate(custom(function = "shared::validation::validate_code_input"))]
    pub code: String,
}

/// Request to redeem a code for a user.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct RedeemCodeRequest {
    #[validate(custom(function = "shared::validation::validate_code_input"))]
    pub code: String,

    #[validate(range(min = 1, message = "user_id must be positive"))]
    pub user_id: i64,
}

/// Request to delete several codes by id.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct BulkDeleteCodesRequest {
    #[validate(length(min = 1, max = 1000, message = "ids must hold between 1 and 1000 entries"))]
    pub ids: Vec<i64>,
}

/// Query parameters for listing codes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ListCodesQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub group_name: Option<String>,
    pub course_id: Option<i64>,
    pub is_used: Option<bool>,
    pub role: Option<String>,
    pub created_by: Option<i64>,
    pub order: Option<SortOrder>,
}

impl ListCodesQuery {
    /// Filters named by the query. Blank strings mean "any".
    pub fn filter(&self) -> CodeFilter {
        CodeFilter {
            group_name: non_blank(self.group_name.as_deref()),
            course_id: self.course_id,
            is_used: self.is_used,
            role: non_blank(self.role.as_deref()),
            created_by: self.created_by,
            order: self.order.unwrap_or_default(),
        }
    }

    pub fn page_request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Outcome of a redemption attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Redemption {
    pub redeemed: bool,
    pub validation: CodeValidation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<Code>,
}

/// Normalize a user-submitted code for lookup and storage.
pub fn normalize_code(input: &str) -> String {
    input.trim().to_ascii_uppercase()
}

/// Turn a blank optional string into `None` and trim the rest.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn code(max_uses: i32, used_count: i32, expiry_date: Option<DateTime<Utc>>) -> Code {
        Code {
            id: 1,
            code: "ABCD2345".to_string(),
            role: DEFAULT_ROLE.to_string(),
            group_name: Some("Class 7B".to_string()),
            course_id: Some(42),
            max_uses,
            used_count,
            is_used: used_count >= max_uses,
            used_by: None,
            used_at: None,
            expiry_date,
            created_by: Some(1),
            created_at: Utc::now(),
        }
    }
}
