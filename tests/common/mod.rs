#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode},
};
use chatgate::auth::Argon2Hashing;
use chatgate::jwt::{JwtConfig, SigningSecret};
use chatgate::{ServerConfig, create_app, db::Database};
use tower::ServiceExt;

pub const TEST_SECRET: [u8; 32] = [7u8; 32];

pub fn test_secret() -> SigningSecret {
    SigningSecret::new(TEST_SECRET.to_vec()).expect("Test secret is long enough")
}

pub fn test_jwt() -> JwtConfig {
    JwtConfig::new(&test_secret())
}

/// Server configuration with cheap password hashing and no rate limiting.
pub fn test_config(db: Database) -> ServerConfig {
    let params = argon2::Params::new(8, 1, 1, None).expect("Valid Argon2 params");
    let mut config = ServerConfig::new(db, test_secret());
    config.password_hashing = Arc::new(Argon2Hashing::with_params(params));
    config.rate_limit = false;
    config
}

pub async fn create_test_app() -> (Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    (create_app(&test_config(db.clone())), db)
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn register(app: &Router, username: &str, email: &str, password: &str) {
    let response = post_json(
        app,
        "/api/auth/register",
        serde_json::json!({ "username": username, "email": email, "password": password }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

/// Log in and return the token pair response body.
pub async fn login(app: &Router, email: &str, password: &str) -> serde_json::Value {
    let response = post_json(
        app,
        "/api/auth/login",
        serde_json::json!({ "email": email, "password": password }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}
