#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use stockdash_api::auth::jwt::JwtConfig;
use stockdash_api::config::ServerConfig;
use stockdash_api::router::build_app_router;
use stockdash_api::state::AppState;
use stockdash_db::MemoryUserStore;

pub const ADMIN_EMAIL: &str = "admin@example.com";

/// Build a test `ServerConfig` with safe defaults and a fixed JWT secret.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        admin_email: Some(ADMIN_EMAIL.to_string()),
        jwt: JwtConfig {
            secret: "test-secret-for-integration-tests".to_string(),
            token_expiry_hours: 1,
        },
    }
}

/// Build the full application router over a fresh in-memory user store.
pub fn build_test_app() -> Router {
    let config = test_config();
    let state = AppState {
        users: Arc::new(MemoryUserStore::new()),
        config: Arc::new(config.clone()),
    };
    build_app_router(state, &config)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// CORS preflight from the dashboard origin asking for `method`.
pub async fn preflight(app: Router, uri: &str, method: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri(uri)
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", method)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}
