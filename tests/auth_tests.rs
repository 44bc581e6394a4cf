mod common;

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode},
};
use chatgate::{create_app, db::Database};
use common::{create_test_app, json_body, login, post_json, register, test_config, test_jwt};
use serde_json::json;
use tower::ServiceExt;

async fn request_with_bearer(
    app: &axum::Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
) -> axum::http::Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_register_success() {
    let (app, db) = create_test_app().await;

    let response = post_json(
        &app,
        "/api/auth/register",
        json!({ "username": "alice", "email": "a@x.com", "password": "pw1" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = json_body(response).await;
    assert_eq!(json["message"], "User registered successfully");
    // Registration never issues tokens
    assert!(json.get("accessToken").is_none());

    let user = db.users().get_by_email("a@x.com").await.unwrap().unwrap();
    assert_eq!(user.username, "alice");
    assert_ne!(user.password_hash, "pw1");
}

#[tokio::test]
async fn test_register_validation() {
    let (app, _) = create_test_app().await;

    let long_name = "a".repeat(33);
    let cases = [
        json!({ "username": "  ", "email": "a@x.com", "password": "pw" }),
        json!({ "username": long_name, "email": "a@x.com", "password": "pw" }),
        json!({ "username": "alice", "email": "not-an-email", "password": "pw" }),
        json!({ "username": "alice", "email": "a@x.com", "password": "" }),
    ];

    for body in cases {
        let response = post_json(&app, "/api/auth/register", body.clone()).await;
        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "Expected 400 for {}",
            body
        );
    }
}

#[tokio::test]
async fn test_malformed_body_gets_json_error() {
    let (app, _) = create_test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Invalid request body");

    // Missing field
    let response = post_json(&app, "/api/auth/refresh", json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Invalid request body");

    // Missing content type
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/register")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Invalid request body");
}

#[tokio::test]
async fn test_register_duplicates_conflict() {
    let (app, db) = create_test_app().await;
    register(&app, "alice", "a@x.com", "pw1").await;

    let response = post_json(
        &app,
        "/api/auth/register",
        json!({ "username": "alice", "email": "other@x.com", "password": "pw" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"], "Username is already taken");

    let response = post_json(
        &app,
        "/api/auth/register",
        json!({ "username": "bob", "email": "a@x.com", "password": "pw" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["error"], "Email is already registered");

    assert!(db.users().get_by_username("bob").await.unwrap().is_none());
}

#[tokio::test]
async fn test_register_disabled_with_no_signup() {
    let db = Database::open(":memory:").await.unwrap();
    let mut config = test_config(db);
    config.no_signup = true;
    let app = create_app(&config);

    let response = post_json(
        &app,
        "/api/auth/register",
        json!({ "username": "alice", "email": "a@x.com", "password": "pw" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_login_returns_token_pair() {
    let (app, _) = create_test_app().await;
    register(&app, "alice", "a@x.com", "pw1").await;

    let json = login(&app, "a@x.com", "pw1").await;
    assert_eq!(json["username"], "alice");
    assert_eq!(json["email"], "a@x.com");

    let access = json["accessToken"].as_str().unwrap();
    assert!(test_jwt().is_valid(access, "a@x.com"));
    assert!(!json["refreshToken"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let (app, _) = create_test_app().await;
    register(&app, "alice", "a@x.com", "pw1").await;

    let wrong_password = post_json(
        &app,
        "/api/auth/login",
        json!({ "email": "a@x.com", "password": "wrong" }),
    )
    .await;
    let unknown_email = post_json(
        &app,
        "/api/auth/login",
        json!({ "email": "nobody@x.com", "password": "pw1" }),
    )
    .await;

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(wrong_password).await, json_body(unknown_email).await);
}

#[tokio::test]
async fn test_refresh_rotates_and_is_single_use() {
    let (app, _) = create_test_app().await;
    register(&app, "alice", "a@x.com", "pw1").await;
    let first = login(&app, "a@x.com", "pw1").await;
    let first_refresh = first["refreshToken"].as_str().unwrap();

    let response = post_json(
        &app,
        "/api/auth/refresh",
        json!({ "refreshToken": first_refresh }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let second = json_body(response).await;
    assert_ne!(second["refreshToken"], first["refreshToken"]);
    assert!(test_jwt().is_valid(second["accessToken"].as_str().unwrap(), "a@x.com"));

    // Replaying the redeemed token fails
    let replay = post_json(
        &app,
        "/api/auth/refresh",
        json!({ "refreshToken": first_refresh }),
    )
    .await;
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);

    // Unknown token gives the same response
    let unknown = post_json(
        &app,
        "/api/auth/refresh",
        json!({ "refreshToken": "never-issued" }),
    )
    .await;
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(replay).await, json_body(unknown).await);
}

#[tokio::test]
async fn test_expired_refresh_token_rejected_like_unknown() {
    let db = Database::open(":memory:").await.unwrap();
    let mut config = test_config(db.clone());
    config.refresh_token_duration = 0;
    let app = create_app(&config);

    register(&app, "alice", "a@x.com", "pw1").await;
    let pair = login(&app, "a@x.com", "pw1").await;

    let response = post_json(
        &app,
        "/api/auth/refresh",
        json!({ "refreshToken": pair["refreshToken"] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "Invalid refresh token");

    // The expired session is gone
    let user = db.users().get_by_email("a@x.com").await.unwrap().unwrap();
    assert!(db.refresh_sessions().get_by_user(user.id).await.unwrap().is_none());
}

/// Login, login again elsewhere, then the first refresh token is dead while
/// its access token remains usable until expiry.
#[tokio::test]
async fn test_second_login_revokes_first_session() {
    let (app, _) = create_test_app().await;
    register(&app, "alice", "a@x.com", "pw1").await;

    let first = login(&app, "a@x.com", "pw1").await;
    let second = login(&app, "a@x.com", "pw1").await;

    let response = post_json(
        &app,
        "/api/auth/refresh",
        json!({ "refreshToken": first["refreshToken"] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = request_with_bearer(
        &app,
        "GET",
        "/api/auth/verify",
        first["accessToken"].as_str(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = post_json(
        &app,
        "/api/auth/refresh",
        json!({ "refreshToken": second["refreshToken"] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_logout_revokes_refresh_token() {
    let (app, _) = create_test_app().await;
    register(&app, "alice", "a@x.com", "pw1").await;
    let pair = login(&app, "a@x.com", "pw1").await;

    let response = request_with_bearer(
        &app,
        "POST",
        "/api/auth/logout",
        pair["accessToken"].as_str(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["message"], "Logged out successfully");

    let response = post_json(
        &app,
        "/api/auth/refresh",
        json!({ "refreshToken": pair["refreshToken"] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_always_succeeds() {
    let (app, _) = create_test_app().await;
    register(&app, "alice", "a@x.com", "pw1").await;
    let pair = login(&app, "a@x.com", "pw1").await;

    // No token, garbage token, and a token for an unknown subject
    let stranger = test_jwt()
        .issue("nobody@x.com", serde_json::Map::new())
        .unwrap()
        .token;
    for token in [None, Some("garbage"), Some(stranger.as_str())] {
        let response = request_with_bearer(&app, "POST", "/api/auth/logout", token).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    // None of those touched alice's session
    let response = post_json(
        &app,
        "/api/auth/refresh",
        json!({ "refreshToken": pair["refreshToken"] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_verify_requires_valid_bearer() {
    let (app, _) = create_test_app().await;
    register(&app, "alice", "a@x.com", "pw1").await;
    let pair = login(&app, "a@x.com", "pw1").await;

    let response =
        request_with_bearer(&app, "GET", "/api/auth/verify", pair["accessToken"].as_str()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["subject"], "a@x.com");

    let response = request_with_bearer(&app, "GET", "/api/auth/verify", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = request_with_bearer(&app, "GET", "/api/auth/verify", Some("a.b.c")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "Not authenticated");
}

#[tokio::test]
async fn test_register_rate_limited_per_ip() {
    let db = Database::open(":memory:").await.unwrap();
    let mut config = test_config(db);
    config.rate_limit = true;
    let app = create_app(&config);

    let addr: SocketAddr = "10.0.0.1:5000".parse().unwrap();
    let mut statuses = Vec::new();
    for i in 0..4 {
        let body = json!({
            "username": format!("user{}", i),
            "email": format!("u{}@x.com", i),
            "password": "pw",
        });
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/register")
                    .header("content-type", "application/json")
                    .extension(ConnectInfo(addr))
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        statuses.push(response.status());
    }

    assert_eq!(&statuses[..3], &[StatusCode::CREATED; 3]);
    assert_eq!(statuses[3], StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_rate_limit_requires_client_ip() {
    let db = Database::open(":memory:").await.unwrap();
    let mut config = test_config(db);
    config.rate_limit = true;
    let app = create_app(&config);

    let response = post_json(
        &app,
        "/api/auth/login",
        json!({ "email": "a@x.com", "password": "pw" }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
