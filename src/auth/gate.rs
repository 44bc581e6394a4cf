//! Authentication gate for persistent connections.
//!
//! Runs once on the upgrade request, before the connection is accepted or
//! registered anywhere. The resulting [`Principal`] is attached to the
//! connection and trusted for its lifetime; later frames are not re-checked.

use axum::http::{HeaderMap, header};

use super::errors::HandshakeRejected;
use crate::jwt::JwtConfig;

const BEARER_PREFIX: &str = "Bearer ";

/// The authenticated identity of a connection or request.
///
/// Only constructed by [`authenticate_handshake`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    subject: String,
}

impl Principal {
    /// The token subject (the user's email).
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, HandshakeRejected> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(HandshakeRejected::MissingCredential)?
        .to_str()
        .map_err(|_| HandshakeRejected::MalformedHeader)?;

    let token = value
        .strip_prefix(BEARER_PREFIX)
        .ok_or(HandshakeRejected::MalformedHeader)?
        .trim();

    if token.is_empty() {
        return Err(HandshakeRejected::MalformedHeader);
    }
    Ok(token)
}

/// Validate the bearer credential of a handshake and return its principal.
///
/// Pure validate-then-return: nothing is created or mutated, so an aborted
/// handshake leaves no state behind.
pub fn authenticate_handshake(
    headers: &HeaderMap,
    jwt: &JwtConfig,
) -> Result<Principal, HandshakeRejected> {
    let token = bearer_token(headers)?;

    let subject = jwt.subject_of(token).map_err(|e| {
        tracing::debug!(error = %e, "Could not read token subject");
        HandshakeRejected::InvalidToken
    })?;

    if !jwt.is_valid(token, &subject) {
        return Err(HandshakeRejected::InvalidToken);
    }

    Ok(Principal { subject })
}
