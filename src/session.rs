//! Register, login, refresh and logout.
//!
//! Each user has at most one refresh session. Issuing a refresh token always
//! replaces whatever session the user had, so logging in elsewhere revokes the
//! previous refresh token (its access token lives on until it expires).
//! Refresh tokens are single use: redeeming one deletes it, whether or not the
//! redemption succeeds.

use std::sync::Arc;

use base64::Engine;
use serde::Serialize;
use serde_json::Map;
use tracing::{debug, info, warn};

use crate::auth::{AuthError, CredentialVerifier};
use crate::db::{Database, RefreshSession, User};
use crate::jwt::{JwtConfig, now_secs};

/// Refresh token duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Access and refresh token pair plus the profile fields returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub username: String,
    pub email: String,
}

#[derive(Clone)]
pub struct SessionManager {
    db: Database,
    jwt: Arc<JwtConfig>,
    credentials: CredentialVerifier,
    refresh_duration: u64,
}

impl SessionManager {
    pub fn new(db: Database, jwt: Arc<JwtConfig>, credentials: CredentialVerifier) -> Self {
        Self {
            db,
            jwt,
            credentials,
            refresh_duration: REFRESH_TOKEN_DURATION_SECS,
        }
    }

    pub fn with_refresh_duration(mut self, secs: u64) -> Self {
        self.refresh_duration = secs;
        self
    }

    /// Create an account. No tokens are issued; the client logs in separately.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        let users = self.db.users();

        if users
            .exists_by_username(username)
            .await
            .map_err(|e| AuthError::internal("Failed to check username", e))?
        {
            return Err(AuthError::DuplicateUsername);
        }

        if users
            .exists_by_email(email)
            .await
            .map_err(|e| AuthError::internal("Failed to check email", e))?
        {
            return Err(AuthError::DuplicateEmail);
        }

        let password_hash = self
            .credentials
            .hash_password(password)
            .await
            .map_err(|e| AuthError::internal("Failed to hash password", e))?;

        // A concurrent registration can still win between the checks and the insert.
        users
            .create(username, email, &password_hash)
            .await
            .map_err(|e| match unique_violation_column(&e) {
                Some(column) if column.contains("username") => AuthError::DuplicateUsername,
                Some(_) => AuthError::DuplicateEmail,
                None => AuthError::internal("Failed to create user", e),
            })?;

        info!(%username, "User registered");
        Ok(())
    }

    /// Check credentials and issue a fresh token pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let user = self
            .db
            .users()
            .get_by_email(email)
            .await
            .map_err(|e| AuthError::internal("Failed to get user", e))?;

        // Runs even for unknown emails so both failures look the same.
        if !self.credentials.verify(user.as_ref(), password).await {
            debug!(user_exists = user.is_some(), "Login rejected");
            return Err(AuthError::InvalidCredentials);
        }
        let Some(user) = user else {
            return Err(AuthError::InvalidCredentials);
        };

        let pair = self.issue_pair(&user, None).await?;
        info!(subject = %user.email, "User logged in");
        Ok(pair)
    }

    /// Redeem a refresh token for a new pair. The presented token is dead afterwards.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let store = self.db.refresh_sessions();

        let session = store
            .get_by_token(refresh_token)
            .await
            .map_err(|e| AuthError::internal("Failed to look up refresh session", e))?
            .ok_or(AuthError::RefreshTokenNotFound)?;

        if session.is_expired(self.now()?) {
            store
                .delete(&session)
                .await
                .map_err(|e| AuthError::internal("Failed to delete expired session", e))?;
            warn!(user_id = session.user_id, "Expired refresh token presented");
            return Err(AuthError::RefreshTokenExpired);
        }

        let user = self
            .db
            .users()
            .get_by_id(session.user_id)
            .await
            .map_err(|e| AuthError::internal("Failed to get user", e))?
            .ok_or(AuthError::RefreshTokenNotFound)?;

        let pair = self.issue_pair(&user, Some(&session)).await?;
        debug!(subject = %user.email, "Refresh token rotated");
        Ok(pair)
    }

    /// Drop the refresh session of the user named by `subject`.
    /// Succeeds whether or not the user or a session exists. Outstanding access
    /// tokens stay valid until they expire. Returns the number of deleted sessions.
    pub async fn logout(&self, subject: &str) -> Result<u64, AuthError> {
        let Some(user) = self
            .db
            .users()
            .get_by_email(subject)
            .await
            .map_err(|e| AuthError::internal("Failed to get user", e))?
        else {
            return Ok(0);
        };

        let deleted = self
            .db
            .refresh_sessions()
            .delete_all_for_user(user.id)
            .await
            .map_err(|e| AuthError::internal("Failed to delete refresh sessions", e))?;

        info!(%subject, deleted, "User logged out");
        Ok(deleted)
    }

    async fn issue_pair(
        &self,
        user: &User,
        redeemed: Option<&RefreshSession>,
    ) -> Result<TokenPair, AuthError> {
        let access = self
            .jwt
            .issue(&user.email, Map::new())
            .map_err(|e| AuthError::internal("Failed to generate access token", e))?;

        let refresh_token = self.issue_refresh(user.id, redeemed).await?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token,
            username: user.username.clone(),
            email: user.email.clone(),
        })
    }

    /// Replace the user's refresh session with a new one, in one transaction.
    async fn issue_refresh(
        &self,
        user_id: i64,
        redeemed: Option<&RefreshSession>,
    ) -> Result<String, AuthError> {
        let token = generate_refresh_token();
        let lifetime = i64::try_from(self.refresh_duration).unwrap_or(i64::MAX);
        let expires_at = self.now()?.saturating_add(lifetime);

        let replaced = self
            .db
            .refresh_sessions()
            .replace_for_user(user_id, redeemed, &token, expires_at)
            .await
            .map_err(|e| AuthError::internal("Failed to store refresh session", e))?;

        if !replaced {
            // Lost a race with another redemption of the same token.
            return Err(AuthError::RefreshTokenNotFound);
        }
        Ok(token)
    }

    fn now(&self) -> Result<i64, AuthError> {
        now_secs()
            .map(|secs| secs as i64)
            .map_err(|e| AuthError::internal("Failed to read clock", e))
    }
}

/// 256 bits from the OS-seeded CSPRNG, base64url encoded.
fn generate_refresh_token() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// The constraint message of a UNIQUE violation, e.g. "... users.email".
fn unique_violation_column(e: &sqlx::Error) -> Option<String> {
    let db_err = e.as_database_error()?;
    if db_err.is_unique_violation() {
        Some(db_err.message().to_string())
    } else {
        None
    }
}
