//! Configuration for Codex
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Codex - game companion database with community corrections
#[derive(Parser, Debug, Clone)]
#[command(name = "codex")]
#[command(about = "Entity database, correction moderation and admin back-office for Codex")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory fallback store, insecure JWT secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "codex")]
    pub mongodb_db: String,

    /// JWT secret for verifying bearer tokens (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Lifetime of cached pages in seconds
    #[arg(long, env = "PAGE_CACHE_TTL_SECS", default_value = "300")]
    pub page_cache_ttl_secs: u64,

    /// Maximum number of cached pages
    #[arg(long, env = "PAGE_CACHE_MAX_ENTRIES", default_value = "10000")]
    pub page_cache_max_entries: usize,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "262144")]
    pub max_body_bytes: usize,

    /// JSON file with entities and users to load at startup
    #[arg(long, env = "SEED_FILE")]
    pub seed_file: Option<PathBuf>,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> Option<String> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => Some(secret.clone()),
            (None, true) => Some("dev-only-insecure-secret".to_string()),
            (None, false) => None,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if self.page_cache_max_entries == 0 {
            return Err("PAGE_CACHE_MAX_ENTRIES must be greater than zero".to_string());
        }

        if self.max_body_bytes == 0 {
            return Err("MAX_BODY_BYTES must be greater than zero".to_string());
        }

        Ok(())
    }

    /// Default tracing filter when RUST_LOG is not set
    pub fn default_log_filter(&self) -> String {
        format!("codex={},info", self.log_level)
    }
}
