//! Common test utilities for integration tests.
//!
//! Apps are built over the in-memory store, so no database is required.

// Not every test binary uses every helper.
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request},
    response::Response,
    Router,
};
use domain::models::{InviteCode, NewInviteCode};
use domain::services::{AdminRepository, CodeRepository, MemoryInviteStore};
use fake::faker::internet::en::UserAgent;
use fake::Fake;
use invite_pool_api::app::create_app;
use invite_pool_api::config::{
    AdminConfig, BootstrapConfig, CodesConfig, Config, DatabaseConfig, LoggingConfig,
    SecurityConfig, ServerConfig, StorageBackend, StorageConfig,
};
use serde_json::Value;
use shared::password::hash_password;
use std::sync::Arc;
use tower::ServiceExt;

pub const ADMIN_USERNAME: &str = "admin";
pub const ADMIN_PASSWORD: &str = "integration-test-password";
pub const IP_HASH_SECRET: &str = "integration-ip-secret";

/// Test configuration for the memory backend with rate limiting off.
pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            request_timeout_secs: 30,
        },
        database: DatabaseConfig::default(),
        storage: StorageConfig {
            backend: StorageBackend::Memory,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
        security: SecurityConfig {
            cors_origins: vec![],
            rate_limit_per_minute: 0,
            ip_hash_secret: IP_HASH_SECRET.to_string(),
        },
        admin: AdminConfig {
            jwt_secret: "integration-test-jwt-secret-0123456789abcdef".to_string(),
            token_expiry_secs: 3600,
            bootstrap_username: String::new(),
            bootstrap_password: String::new(),
        },
        codes: CodesConfig::default(),
        bootstrap: BootstrapConfig::default(),
    }
}

/// A router plus direct access to the store behind it.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryInviteStore>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryInviteStore::new());
        let router = create_app(config, store.clone()).expect("Failed to build app");
        Self { router, store }
    }

    /// Sends one request through a clone of the router.
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn add_code(&self, code: &str, max_uses: i32) -> InviteCode {
        self.store
            .create_code(NewInviteCode::available(code, max_uses))
            .await
            .expect("Failed to create code")
    }

    pub async fn create_admin(&self) {
        let hash = hash_password(ADMIN_PASSWORD).unwrap();
        self.store
            .create_admin(ADMIN_USERNAME, &hash)
            .await
            .expect("Failed to create admin");
    }

    /// Creates the admin account and returns a session token.
    pub async fn admin_token(&self) -> String {
        self.create_admin().await;
        let response = self
            .send(json_request(
                Method::POST,
                "/api/admin/login",
                serde_json::json!({
                    "username": ADMIN_USERNAME,
                    "password": ADMIN_PASSWORD
                }),
            ))
            .await;
        let body = parse_response_body(response).await;
        body["token"].as_str().expect("login returned no token").to_string()
    }
}

/// Realistic browser user agent.
pub fn user_agent() -> String {
    UserAgent().fake()
}

/// JSON request from a caller at `ip`.
pub fn caller_request(method: Method, uri: &str, ip: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-Forwarded-For", ip)
        .header(header::USER_AGENT, user_agent());

    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Helper to create a JSON request.
pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Request carrying an admin bearer token.
pub fn admin_request(method: Method, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));

    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}
