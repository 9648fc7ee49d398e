//! Common test utilities for integration tests.
//!
//! Every test gets its own router over a fresh in-memory store, so tests
//! need no database and can run in parallel.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use chrono::{DateTime, Utc};
use code_registry_api::{app::create_app, config::Config};
use domain::models::{Code, CodeRecord};
use domain::services::{CodeStore, InMemoryCodeStore};
use shared::crypto::sha256_hex;
use std::sync::Arc;

/// Plain-text admin key whose digest is configured in [`test_config`].
pub const ADMIN_KEY: &str = "test-admin-key";

/// Test configuration with the admin API enabled.
pub fn test_config() -> Config {
    let hash = sha256_hex(ADMIN_KEY);
    Config::load_for_test(&[("security.admin_api_key_hash", hash.as_str())])
        .expect("test config should load")
}

/// Test configuration with no admin key configured.
pub fn test_config_without_admin() -> Config {
    Config::load_for_test(&[]).expect("test config should load")
}

/// A router plus a handle on its store for seeding.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryCodeStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Build the app, checking its store is reachable before handing it out.
    pub async fn ready(config: Config) -> Self {
        let app = Self::with_config(config);
        tokio_test::assert_ok!(app.store.ping().await);
        app
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryCodeStore::new());
        let router = create_app(config, store.clone());
        Self { router, store }
    }

    /// Insert a code directly into the store.
    pub async fn seed(
        &self,
        id: i64,
        code: &str,
        max_uses: i32,
        used_count: i32,
        expiry_date: Option<DateTime<Utc>>,
    ) -> Code {
        self.store
            .seed(CodeRecord {
                id,
                code: code.to_string(),
                role: "subscriber".to_string(),
                group_name: None,
                course_id: None,
                max_uses,
                used_count,
                is_used: used_count >= max_uses,
                used_by: None,
                used_at: None,
                expiry_date,
                created_by: None,
                created_at: Utc::now(),
            })
            .await
    }
}

/// Build a JSON request, optionally carrying the admin key.
pub fn json_request(
    method: Method,
    uri: &str,
    body: serde_json::Value,
    api_key: Option<&str>,
) -> Request<Body> {
    raw_json_request(method, uri, &serde_json::to_string(&body).unwrap(), api_key)
}

/// Build a request with a JSON content type and an arbitrary body.
pub fn raw_json_request(
    method: Method,
    uri: &str,
    body: &str,
    api_key: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = api_key {
        builder = builder.header("X-API-Key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Build a body-less request, optionally carrying the admin key.
pub fn empty_request(method: Method, uri: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("X-API-Key", key);
    }
    builder.body(Body::empty()).unwrap()
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
}

/// Read a response body as text.
pub async fn response_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}
