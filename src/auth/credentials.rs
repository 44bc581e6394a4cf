//! Password hashing and credential checks.

use std::sync::{Arc, OnceLock};

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use crate::db::User;

/// Slow, salted password hash primitive.
pub trait PasswordHashing: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError>;
    /// Constant-time comparison of `plaintext` against a stored digest.
    fn verify(&self, plaintext: &str, digest: &str) -> bool;
}

#[derive(Debug)]
pub struct PasswordError(String);

impl std::fmt::Display for PasswordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Password hashing failed: {}", self.0)
    }
}

impl std::error::Error for PasswordError {}

/// Argon2id hashing with PHC-format digests.
#[derive(Clone)]
pub struct Argon2Hashing {
    params: argon2::Params,
}

impl Argon2Hashing {
    pub fn new() -> Self {
        Self {
            params: argon2::Params::default(),
        }
    }

    /// Use explicit cost parameters (tests use the minimum).
    pub fn with_params(params: argon2::Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            self.params.clone(),
        )
    }
}

impl Default for Argon2Hashing {
    fn default() -> Self {
        Self::new()
    }
}

fn salt() -> Result<SaltString, PasswordError> {
    use rand::RngCore;
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    SaltString::encode_b64(&bytes).map_err(|e| PasswordError(e.to_string()))
}

impl PasswordHashing for Argon2Hashing {
    fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt()?)
            .map(|h| h.to_string())
            .map_err(|e| PasswordError(e.to_string()))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> bool {
        PasswordHash::new(digest)
            .map(|hash| {
                self.argon2()
                    .verify_password(plaintext.as_bytes(), &hash)
                    .is_ok()
            })
            .unwrap_or(false)
    }
}

/// Checks passwords against stored user records.
///
/// Hashing runs on the blocking pool so slow hashes never stall request tasks.
#[derive(Clone)]
pub struct CredentialVerifier {
    hasher: Arc<dyn PasswordHashing>,
    /// Digest checked when the user does not exist, so both failure paths cost the same.
    dummy_digest: Arc<OnceLock<Option<String>>>,
}

impl CredentialVerifier {
    pub fn new(hasher: Arc<dyn PasswordHashing>) -> Self {
        Self {
            hasher,
            dummy_digest: Arc::new(OnceLock::new()),
        }
    }

    pub async fn hash_password(&self, password: &str) -> Result<String, PasswordError> {
        let hasher = self.hasher.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| PasswordError(e.to_string()))?
    }

    /// True iff `user` exists and `password` matches its stored hash.
    pub async fn verify(&self, user: Option<&User>, password: &str) -> bool {
        let hasher = self.hasher.clone();
        let dummy_digest = self.dummy_digest.clone();
        let digest = user.map(|u| u.password_hash.clone());
        let password = password.to_string();

        tokio::task::spawn_blocking(move || match digest {
            Some(digest) => hasher.verify(&password, &digest),
            None => {
                let dummy = dummy_digest.get_or_init(|| hasher.hash("unused-password").ok());
                if let Some(dummy) = dummy {
                    let _ = hasher.verify(&password, dummy);
                }
                false
            }
        })
        .await
        .unwrap_or(false)
    }
}
