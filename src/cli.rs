//! CLI argument parsing, validation, and startup helpers.

use std::sync::Arc;

use crate::ServerConfig;
use crate::auth::Argon2Hashing;
use crate::db::Database;
use crate::jwt::SigningSecret;
use clap::Parser;
use tracing::{error, info};

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "chatgate",
    about = "Token authentication and session lifecycle for real-time chat"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7292")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "chatgate.db")]
    pub database: String,

    /// Path to file containing the base64 JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Access token lifetime in minutes
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    pub access_token_minutes: u64,

    /// Refresh token lifetime in days
    #[arg(long, default_value = "7", value_parser = clap::value_parser!(u64).range(1..))]
    pub refresh_token_days: u64,

    /// Disable new user signups
    #[arg(long)]
    pub no_signup: bool,

    /// Disable per-IP rate limiting of login and signup
    #[arg(long)]
    pub no_rate_limit: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<SigningSecret> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    match SigningSecret::from_base64(&secret) {
        Ok(secret) => Some(secret),
        Err(e) => {
            error!(error = %e, "Invalid JWT secret. Use at least 256 bits of key material");
            None
        }
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database, jwt_secret: SigningSecret) -> ServerConfig {
    ServerConfig {
        db,
        jwt_secret,
        access_token_duration: args.access_token_minutes.saturating_mul(60),
        refresh_token_duration: args.refresh_token_days.saturating_mul(24 * 60 * 60),
        password_hashing: Arc::new(Argon2Hashing::new()),
        no_signup: args.no_signup,
        rate_limit: !args.no_rate_limit,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
