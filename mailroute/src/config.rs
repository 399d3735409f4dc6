//! Configuration module for environment variable parsing.
//!
//! Every setting has a default so a bare `mailroute-web` starts against
//! `config/routes.toml` and queues under `run/`.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

use crate::queue::DEFAULT_UNDELIVERABLE_DIR;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Routes definition loaded at startup
    pub routes_file: PathBuf,

    /// Directory of the undeliverable sink
    pub undeliverable_dir: PathBuf,

    /// Spool drained by the queue receiver
    pub spool_dir: PathBuf,

    /// How long the receiver sleeps when the spool is empty
    pub spool_poll_interval_ms: u64,

    /// Largest message (bytes) the receiver will pop from the spool
    pub queue_pop_limit: Option<u64>,

    /// Where oversize spool messages are moved
    pub oversize_dir: Option<PathBuf>,

    // =========================================================================
    // Web Server Configuration
    // =========================================================================

    /// Port for the intake web server to listen on
    pub port: u16,

    /// Signing key for HMAC signature verification of intake requests
    pub intake_signing_key: Option<String>,

    /// Maximum age in seconds for intake signature timestamps
    pub intake_signature_max_age: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            routes_file: PathBuf::from("config/routes.toml"),
            undeliverable_dir: PathBuf::from(DEFAULT_UNDELIVERABLE_DIR),
            spool_dir: PathBuf::from("run/queue"),
            spool_poll_interval_ms: 1000,
            queue_pop_limit: None,
            oversize_dir: None,
            port: 8025,
            intake_signing_key: None,
            intake_signature_max_age: 300,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            routes_file: env_path("ROUTES_FILE").unwrap_or(defaults.routes_file),

            undeliverable_dir: env_path("UNDELIVERABLE_DIR").unwrap_or(defaults.undeliverable_dir),

            spool_dir: env_path("SPOOL_DIR").unwrap_or(defaults.spool_dir),

            spool_poll_interval_ms: parse_var("SPOOL_POLL_INTERVAL_MS")
                .unwrap_or(defaults.spool_poll_interval_ms),

            queue_pop_limit: parse_var("QUEUE_POP_LIMIT"),

            oversize_dir: env_path("OVERSIZE_DIR"),

            port: parse_var("PORT").unwrap_or(defaults.port),

            intake_signing_key: env::var("INTAKE_SIGNING_KEY").ok(),

            intake_signature_max_age: parse_var("INTAKE_SIGNATURE_MAX_AGE")
                .unwrap_or(defaults.intake_signature_max_age), // 5 minutes default
        }
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Parse a variable, warning and falling back when the value is malformed.
fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;

    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            None
        }
    }
}
