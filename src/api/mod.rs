mod auth;
mod error;
mod ws;

use axum::Router;
use std::sync::Arc;

use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;
use crate::relay::Relay;
use crate::session::SessionManager;

pub use auth::AuthState;
pub use error::ApiError;
pub use ws::WsState;

/// Create the API router.
pub fn create_api_router(
    db: Database,
    jwt: Arc<JwtConfig>,
    sessions: SessionManager,
    relay: Relay,
    no_signup: bool,
    rate_limit_config: Option<Arc<RateLimitConfig>>,
) -> Router {
    let auth_state = AuthState {
        sessions,
        jwt: jwt.clone(),
        no_signup,
        rate_limit_config,
    };

    let ws_state = WsState { db, jwt, relay };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/ws", ws::router(ws_state))
}
