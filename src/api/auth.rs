//! Account and token endpoints: register, login, refresh, logout, verify.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::error::ApiError;
use crate::auth::{BearerAuth, OptionalAuth};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;
use crate::rate_limit::{RateLimitConfig, rate_limit_login, rate_limit_register};
use crate::session::{SessionManager, TokenPair};

const MAX_USERNAME_LENGTH: usize = 32;

#[derive(Clone)]
pub struct AuthState {
    pub sessions: SessionManager,
    pub jwt: Arc<JwtConfig>,
    pub no_signup: bool,
    pub rate_limit_config: Option<Arc<RateLimitConfig>>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let mut login_router = Router::new()
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .with_state(state.clone());

    let session_router = Router::new()
        .route("/logout", post(logout))
        .route("/verify", get(verify))
        .with_state(state.clone());

    if let Some(config) = &state.rate_limit_config {
        login_router =
            login_router.layer(middleware::from_fn_with_state(config.clone(), rate_limit_login));
    }

    let router = Router::new().merge(login_router).merge(session_router);

    if state.no_signup {
        return router;
    }

    let mut register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone());

    if let Some(config) = &state.rate_limit_config {
        register_router = register_router.layer(middleware::from_fn_with_state(
            config.clone(),
            rate_limit_register,
        ));
    }

    router.merge(register_router)
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

#[derive(Deserialize)]
struct RegisterRequest {
    username: String,
    email: String,
    password: String,
}

async fn register(
    State(state): State<AuthState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let username = payload.username.trim();
    let email = payload.email.trim();

    if username.is_empty() {
        return Err(ApiError::bad_request("Username cannot be empty"));
    }

    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(ApiError::bad_request(
            "Username cannot be longer than 32 characters",
        ));
    }

    if !email.contains('@') {
        return Err(ApiError::bad_request("Invalid email address"));
    }

    if payload.password.is_empty() {
        return Err(ApiError::bad_request("Password cannot be empty"));
    }

    state
        .sessions
        .register(username, email, &payload.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: "User registered successfully",
        }),
    ))
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

async fn login(
    State(state): State<AuthState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let Json(payload) = payload?;
    let pair = state
        .sessions
        .login(payload.email.trim(), &payload.password)
        .await?;
    Ok(Json(pair))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: String,
}

async fn refresh(
    State(state): State<AuthState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenPair>, ApiError> {
    let Json(payload) = payload?;
    let pair = state.sessions.refresh(&payload.refresh_token).await?;
    Ok(Json(pair))
}

/// Always succeeds. Only a valid access token leads to the session being dropped.
async fn logout(
    State(state): State<AuthState>,
    OptionalAuth(principal): OptionalAuth,
) -> Json<MessageResponse> {
    if let Some(principal) = principal {
        if let Err(e) = state.sessions.logout(principal.subject()).await {
            warn!(subject = %principal.subject(), error = %e, "Logout failed");
        }
    }

    Json(MessageResponse {
        message: "Logged out successfully",
    })
}

#[derive(Serialize)]
struct VerifyResponse {
    subject: String,
}

async fn verify(BearerAuth(principal): BearerAuth) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        subject: principal.subject().to_string(),
    })
}
