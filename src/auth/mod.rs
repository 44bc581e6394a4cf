//! Credential checks and bearer-token authentication.
//!
//! Access tokens are validated statelessly by the gate, both on persistent
//! connection handshakes and on ordinary requests via [`BearerAuth`].

mod credentials;
mod errors;
mod extractors;
mod gate;
mod state;

pub use credentials::{Argon2Hashing, CredentialVerifier, PasswordError, PasswordHashing};
pub use errors::{AuthError, HandshakeRejected};
pub use extractors::{BearerAuth, OptionalAuth};
pub use gate::{Principal, authenticate_handshake, bearer_token};
pub use state::HasAuthBackend;
