use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use domain::services::{CodeService, CodeStore};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, require_admin, trace_id};
use crate::routes::{codes, health};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CodeService>,
    pub config: Arc<Config>,
}

pub fn create_app(config: Config, store: Arc<dyn CodeStore>) -> Router {
    let config = Arc::new(config);

    let service = Arc::new(CodeService::new(
        store,
        config.codes.clone(),
        config.messages.clone(),
    ));

    let state = AppState {
        service,
        config: config.clone(),
    };

    // Build CORS layer based on configuration
    let cors = if config.security.cors_origins.is_empty() {
        // Default: allow any origin (for development)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Admin routes (require admin API key)
    // Static segments win over `:key`, which serves GET by code and DELETE by id.
    let admin_routes = Router::new()
        .route(
            "/api/v1/admin/codes",
            get(codes::list_codes).post(codes::generate_codes),
        )
        .route("/api/v1/admin/codes/stats", get(codes::code_stats))
        .route("/api/v1/admin/codes/export", get(codes::export_codes))
        .route("/api/v1/admin/codes/redeem", post(codes::redeem_code))
        .route(
            "/api/v1/admin/codes/bulk-delete",
            post(codes::bulk_delete_codes),
        )
        .route(
            "/api/v1/admin/codes/:key",
            get(codes::get_code).delete(codes::delete_code),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler))
        .route("/api/v1/codes/validate", post(codes::validate_code));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware)) // Prometheus metrics
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id)) // Request ID and logging
        .layer(cors)
        .with_state(state)
}
