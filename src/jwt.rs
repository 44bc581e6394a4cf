//! Access token signing and validation.
//!
//! Access tokens are compact HS256 JWTs carrying the subject (the user's email),
//! issued-at and expiry. They are never stored: a correctly signed, unexpired
//! token is trusted on its own.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{SystemTime, UNIX_EPOCH};

/// Minimum signing secret length in bytes (256 bits).
pub const MIN_SECRET_BYTES: usize = 32;

/// Default access token lifetime: 1 hour
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 60 * 60;

/// A validated HMAC signing secret.
///
/// Construction is the only place the length precondition is checked, so a
/// `SigningSecret` in hand is always long enough.
#[derive(Clone)]
pub struct SigningSecret(Vec<u8>);

impl SigningSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, SecretError> {
        let bytes = bytes.into();
        if bytes.len() < MIN_SECRET_BYTES {
            return Err(SecretError::TooShort { len: bytes.len() });
        }
        Ok(Self(bytes))
    }

    /// Decode a base64 secret. Input that is not valid base64 is used as raw bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, SecretError> {
        use base64::Engine;
        let encoded = encoded.trim();
        match base64::engine::general_purpose::STANDARD.decode(encoded) {
            Ok(bytes) => Self::new(bytes),
            Err(_) => Self::new(encoded.as_bytes()),
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningSecret({} bytes)", self.0.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    TooShort { len: usize },
}

impl std::fmt::Display for SecretError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretError::TooShort { len } => write!(
                f,
                "JWT secret is {} bytes, at least {} are required",
                len, MIN_SECRET_BYTES
            ),
        }
    }
}

impl std::error::Error for SecretError {}

/// JWT claims for access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user email)
    pub sub: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Caller-supplied extra claims
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of generating an access token.
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// The JWT token string
    pub token: String,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_duration: u64,
}

impl JwtConfig {
    /// Create a JWT configuration with the default access token lifetime.
    pub fn new(secret: &SigningSecret) -> Self {
        Self::with_duration(secret, ACCESS_TOKEN_DURATION_SECS)
    }

    pub fn with_duration(secret: &SigningSecret, access_duration: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_duration,
        }
    }

    pub fn access_duration(&self) -> u64 {
        self.access_duration
    }

    /// Issue an access token for `subject` with optional extra claims.
    pub fn issue(
        &self,
        subject: &str,
        extra: Map<String, Value>,
    ) -> Result<AccessTokenResult, JwtError> {
        self.issue_at(subject, extra, now_secs()?)
    }

    pub(crate) fn issue_at(
        &self,
        subject: &str,
        mut extra: Map<String, Value>,
        now: u64,
    ) -> Result<AccessTokenResult, JwtError> {
        // Registered claims always win over caller-supplied ones.
        for reserved in ["sub", "iat", "exp"] {
            extra.remove(reserved);
        }

        let exp = now.saturating_add(self.access_duration);
        let claims = AccessClaims {
            sub: subject.to_string(),
            iat: now,
            exp,
            extra,
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult {
            token,
            expires_at: exp,
            duration: self.access_duration,
        })
    }

    /// Verify the signature and decode the claims without checking expiry.
    pub fn decode(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Expiry is compared against our own clock in `validate_at`.
        validation.validate_exp = false;
        // No audience is configured, so an `aud` extra claim must not fail decoding.
        validation.validate_aud = false;

        jsonwebtoken::decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => JwtError::BadSignature,
                _ => JwtError::Malformed,
            })
    }

    /// Return the subject a token claims, without checking expiry.
    pub fn subject_of(&self, token: &str) -> Result<String, JwtError> {
        self.decode(token).map(|claims| claims.sub)
    }

    /// Decode and check expiry. The distinct error is for logging only.
    pub fn validate(&self, token: &str) -> Result<AccessClaims, JwtError> {
        self.validate_at(token, now_secs()?)
    }

    pub(crate) fn validate_at(&self, token: &str, now: u64) -> Result<AccessClaims, JwtError> {
        let claims = self.decode(token)?;
        if now >= claims.exp {
            return Err(JwtError::Expired);
        }
        Ok(claims)
    }

    /// True iff the token is correctly signed, names exactly `expected_subject`
    /// and has not expired.
    pub fn is_valid(&self, token: &str, expected_subject: &str) -> bool {
        match now_secs() {
            Ok(now) => self.is_valid_at(token, expected_subject, now),
            Err(_) => false,
        }
    }

    pub(crate) fn is_valid_at(&self, token: &str, expected_subject: &str, now: u64) -> bool {
        match self.validate_at(token, now) {
            Ok(claims) => claims.sub == expected_subject,
            Err(e) => {
                tracing::debug!(error = %e, "Access token rejected");
                false
            }
        }
    }
}

/// Current Unix time in seconds.
pub(crate) fn now_secs() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Not a structurally valid token
    Malformed,
    /// Signature does not match the configured secret
    BadSignature,
    /// Token is past its expiry
    Expired,
    /// System time error
    TimeError,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Malformed => write!(f, "Malformed token"),
            JwtError::BadSignature => write!(f, "Bad token signature"),
            JwtError::Expired => write!(f, "Token expired"),
            JwtError::TimeError => write!(f, "System time error"),
        }
    }
}

impl std::error::Error for JwtError {}
