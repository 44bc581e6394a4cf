//! Axum extractors for authentication.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::errors::HandshakeRejected;
use super::gate::{Principal, authenticate_handshake};
use super::state::HasAuthBackend;

/// Extractor for request/response endpoints that require a bearer access token.
/// Applies the same check as the connection gate.
pub struct BearerAuth(pub Principal);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = HandshakeRejected;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate_handshake(&parts.headers, state.jwt())
            .map(BearerAuth)
            .inspect_err(|reason| tracing::debug!(%reason, "Request not authenticated"))
    }
}

/// Optional authentication extractor - never fails.
pub struct OptionalAuth(pub Option<Principal>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: HasAuthBackend + Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(OptionalAuth(
            authenticate_handshake(&parts.headers, state.jwt()).ok(),
        ))
    }
}
