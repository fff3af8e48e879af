use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::auth::jwt::DEFAULT_TOKEN_TTL_SECS;
use crate::session::{
    SessionConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_CLEANUP_INTERVAL, DEFAULT_MAX_IMAGE_BYTES,
    DEFAULT_RETENTION_DAYS, DEFAULT_STALE_ROOM_HOURS,
};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_DATA_DIR: &str = "./data";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVar(&'static str),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Signing material for bearer tokens, shared with every extractor.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: Arc<str>,
    pub token_ttl_secs: usize,
}

impl AuthConfig {
    pub fn new(jwt_secret: impl Into<Arc<str>>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub cleanup_interval: Duration,
    pub client_url: Option<String>,
    pub auth: AuthConfig,
    pub session: SessionConfig,
}

impl Config {
    /// Reads the process environment. Call `dotenv().ok()` first to pick up a
    /// local `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingEnvironmentVar("JWT_SECRET"))?;

        let retention_days: i64 = parse_or(&lookup, "ROOM_RETENTION_DAYS", DEFAULT_RETENTION_DAYS)?;
        let stale_hours: i64 = parse_or(&lookup, "STALE_ROOM_HOURS", DEFAULT_STALE_ROOM_HOURS)?;
        let cleanup_secs: u64 = parse_or(
            &lookup,
            "CLEANUP_INTERVAL_SECS",
            DEFAULT_CLEANUP_INTERVAL.as_secs(),
        )?;
        if cleanup_secs == 0 {
            return Err(ConfigError::InvalidValue {
                var: "CLEANUP_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }

        let mut auth = AuthConfig::new(jwt_secret);
        auth.token_ttl_secs = parse_or(&lookup, "TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?;

        Ok(Self {
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            data_dir: lookup("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            cleanup_interval: Duration::from_secs(cleanup_secs),
            client_url: lookup("CLIENT_URL").filter(|s| !s.is_empty()),
            auth,
            session: SessionConfig {
                retention: chrono::Duration::days(retention_days),
                stale_after: chrono::Duration::hours(stale_hours),
                max_image_bytes: parse_or(&lookup, "MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES)?,
                channel_capacity: parse_or(
                    &lookup,
                    "ROOM_CHANNEL_CAPACITY",
                    DEFAULT_CHANNEL_CAPACITY,
                )?,
            },
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}
