pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod db;
pub mod jwt;
pub mod rate_limit;
pub mod relay;
pub mod session;

use api::create_api_router;
use auth::{Argon2Hashing, CredentialVerifier, PasswordHashing};
use axum::Router;
use db::Database;
use jwt::{ACCESS_TOKEN_DURATION_SECS, JwtConfig, SigningSecret};
use rate_limit::RateLimitConfig;
use relay::Relay;
use session::{REFRESH_TOKEN_DURATION_SECS, SessionManager};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub jwt_secret: SigningSecret,
    /// Access token lifetime in seconds
    pub access_token_duration: u64,
    /// Refresh token lifetime in seconds
    pub refresh_token_duration: u64,
    /// Password hashing primitive
    pub password_hashing: Arc<dyn PasswordHashing>,
    /// Whether new user signups are disabled
    pub no_signup: bool,
    /// Whether login and signup are rate limited per client IP
    pub rate_limit: bool,
}

impl ServerConfig {
    /// Configuration with default lifetimes, Argon2 defaults, signup and rate limiting enabled.
    pub fn new(db: Database, jwt_secret: SigningSecret) -> Self {
        Self {
            db,
            jwt_secret,
            access_token_duration: ACCESS_TOKEN_DURATION_SECS,
            refresh_token_duration: REFRESH_TOKEN_DURATION_SECS,
            password_hashing: Arc::new(Argon2Hashing::new()),
            no_signup: false,
            rate_limit: true,
        }
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::with_duration(
        &config.jwt_secret,
        config.access_token_duration,
    ));

    let sessions = SessionManager::new(
        config.db.clone(),
        jwt.clone(),
        CredentialVerifier::new(config.password_hashing.clone()),
    )
    .with_refresh_duration(config.refresh_token_duration);

    let rate_limit_config = config.rate_limit.then(|| Arc::new(RateLimitConfig::new()));

    let api_router = create_api_router(
        config.db.clone(),
        jwt,
        sessions,
        Relay::new(),
        config.no_signup,
        rate_limit_config,
    );

    Router::new().nest("/api", api_router)
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(db: &Database) {
    cleanup::run_cleanup(db).await;
    cleanup::spawn_cleanup_scheduler(db.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    // Run cleanup tasks on startup
    init_cleanup(&config.db).await;

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
