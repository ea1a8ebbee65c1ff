//! Process configuration read from the environment.
//!
//! Values are validated here once; the rest of the crate consumes the typed
//! [`AppConfig`].

use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

const DEV_SESSION_SECRET: &str = "dev-secret";

/// Upper bound for `SESSION_TTL_SECS` (one year).
pub const MAX_SESSION_TTL_SECS: i64 = 365 * 24 * 60 * 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be {expected}, got `{value}`")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub session_secret: String,
    pub session_ttl_secs: i64,
    /// `None` runs against the in-memory adapter.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub queries_path: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
    pub allow_direct_queries: bool,
    pub allow_transactions: bool,
    /// Named query returning `area`/`action`/`role` rows.
    pub access_policy_query: Option<String>,
    pub redis_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            session_secret: DEV_SESSION_SECRET.to_string(),
            session_ttl_secs: 3600,
            database_url: None,
            db_max_connections: 10,
            queries_path: None,
            model_path: None,
            allow_direct_queries: false,
            allow_transactions: false,
            access_policy_query: None,
            redis_url: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let session_secret = get("SESSION_SECRET").unwrap_or_else(|| {
            warn!("SESSION_SECRET not set; using insecure dev default");
            defaults.session_secret.clone()
        });

        Ok(Self {
            port: parse_or(&get, "PORT", "a port number", defaults.port)?,
            session_secret,
            session_ttl_secs: session_ttl(&get, defaults.session_ttl_secs)?,
            database_url: get("DATABASE_URL"),
            db_max_connections: parse_or(
                &get,
                "DB_MAX_CONNECTIONS",
                "a positive integer",
                defaults.db_max_connections,
            )?,
            queries_path: get("QUERIES_PATH").map(PathBuf::from),
            model_path: get("MODEL_PATH").map(PathBuf::from),
            allow_direct_queries: flag(&get, "ALLOW_DIRECT_QUERIES")?,
            allow_transactions: flag(&get, "ALLOW_TRANSACTIONS")?,
            access_policy_query: get("ACCESS_POLICY_QUERY"),
            redis_url: get("REDIS_URL"),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            expected,
            value,
        }),
    }
}

fn session_ttl(get: &impl Fn(&str) -> Option<String>, default: i64) -> Result<i64, ConfigError> {
    const EXPECTED: &str = "a number of seconds between 1 and 31536000";

    let ttl = parse_or(get, "SESSION_TTL_SECS", EXPECTED, default)?;
    if (1..=MAX_SESSION_TTL_SECS).contains(&ttl) {
        Ok(ttl)
    } else {
        Err(ConfigError::Invalid {
            key: "SESSION_TTL_SECS",
            expected: EXPECTED,
            value: ttl.to_string(),
        })
    }
}

fn flag(get: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<bool, ConfigError> {
    match get(key) {
        None => Ok(false),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                key,
                expected: "a boolean",
                value,
            }),
        },
    }
}
