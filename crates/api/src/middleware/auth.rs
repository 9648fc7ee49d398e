//! Authentication middleware.
//!
//! Guards the admin routes with the configured admin API key.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::app::AppState;
use crate::extractors::admin_key::{AdminAuth, API_KEY_HEADER};

/// Middleware for admin-only routes.
///
/// Rejects requests without the admin key in `X-API-Key`. On success the
/// [`AdminAuth`] marker is stored in request extensions.
pub async fn require_admin(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let presented = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match AdminAuth::validate(&state.config.security, presented) {
        Ok(auth) => {
            req.extensions_mut().insert(auth);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}
