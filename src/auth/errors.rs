//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Failures returned by the session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    DuplicateUsername,
    DuplicateEmail,
    /// Unknown email or wrong password; the two are deliberately not distinguished.
    InvalidCredentials,
    RefreshTokenNotFound,
    RefreshTokenExpired,
    /// Storage, hashing or clock failure. The detail has already been logged.
    Internal(&'static str),
}

impl AuthError {
    /// Log an internal failure and return a generic error.
    pub(crate) fn internal(context: &'static str, e: impl std::fmt::Display) -> Self {
        tracing::error!(error = %e, "{}", context);
        AuthError::Internal(context)
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::DuplicateUsername => write!(f, "Username is already taken"),
            AuthError::DuplicateEmail => write!(f, "Email is already registered"),
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::RefreshTokenNotFound => write!(f, "Refresh token not found"),
            AuthError::RefreshTokenExpired => write!(f, "Refresh token expired"),
            AuthError::Internal(context) => write!(f, "{}", context),
        }
    }
}

impl std::error::Error for AuthError {}

/// Why a bearer credential was refused. Only ever logged; clients see a
/// generic "Not authenticated".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeRejected {
    MissingCredential,
    MalformedHeader,
    InvalidToken,
}

impl std::fmt::Display for HandshakeRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandshakeRejected::MissingCredential => write!(f, "no authorization header"),
            HandshakeRejected::MalformedHeader => write!(f, "authorization header is not a bearer token"),
            HandshakeRejected::InvalidToken => write!(f, "invalid, expired or mis-signed token"),
        }
    }
}

impl std::error::Error for HandshakeRejected {}

impl IntoResponse for HandshakeRejected {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Not authenticated",
            }),
        )
            .into_response()
    }
}
