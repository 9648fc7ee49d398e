//! Admin API key extractor.
//!
//! Admin access is granted by presenting the key whose SHA-256 digest is
//! configured as `security.admin_api_key_hash`.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::app::AppState;
use crate::config::SecurityConfig;
use crate::error::ApiError;
use shared::crypto::verify_key;

/// Header carrying the admin API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Proof that the request carried the admin key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminAuth;

impl AdminAuth {
    /// Check a presented key against the configured digest.
    pub fn validate(security: &SecurityConfig, presented: Option<&str>) -> Result<Self, ApiError> {
        if !security.admin_enabled() {
            return Err(ApiError::Forbidden("Admin API is disabled".to_string()));
        }

        let key = presented
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("Invalid or missing API key".to_string()))?;

        if verify_key(key, &security.admin_api_key_hash) {
            Ok(AdminAuth)
        } else {
            tracing::warn!("Rejected request with invalid admin API key");
            Err(ApiError::Unauthorized(
                "Invalid or missing API key".to_string(),
            ))
        }
    }
}

fn presented_key(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
}

/// Optional admin authentication.
///
/// Never rejects: a missing or wrong key yields `None`.
#[derive(Debug, Clone, Copy)]
pub struct OptionalAdminAuth(pub Option<AdminAuth>);

impl OptionalAdminAuth {
    pub fn is_admin(&self) -> bool {
        self.0.is_some()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for OptionalAdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(key) = presented_key(parts) else {
            return Ok(OptionalAdminAuth(None));
        };
        Ok(OptionalAdminAuth(
            AdminAuth::validate(&state.config.security, Some(key)).ok(),
        ))
    }
}
