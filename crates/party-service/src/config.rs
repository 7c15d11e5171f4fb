//! Party service configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use crate::catalog::tmdb::DEFAULT_TMDB_BASE_URL;
use crate::hub::connection::{HubSettings, DEFAULT_OUTBOUND_BUFFER};
use crate::party::CoordinatorSettings;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default party record TTL in seconds (24 hours).
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 86_400;

/// Default party lock expiry in seconds.
pub const DEFAULT_LOCK_DURATION_SECONDS: u64 = 15;

/// Default catalog call timeout in seconds.
pub const DEFAULT_CATALOG_TIMEOUT_SECONDS: u64 = 10;

/// Default WebSocket ping interval in seconds.
pub const DEFAULT_WS_PING_INTERVAL_SECONDS: u64 = 54;

/// Default WebSocket read deadline in seconds.
pub const DEFAULT_WS_READ_TIMEOUT_SECONDS: u64 = 60;

/// Default maximum inbound WebSocket message size in bytes.
pub const DEFAULT_WS_MAX_MESSAGE_BYTES: usize = 4096;

/// Party service configuration.
#[derive(Clone)]
pub struct Config {
    /// Redis connection URL. May embed credentials.
    pub redis_url: SecretString,

    /// TMDB v3 API key.
    pub tmdb_api_key: SecretString,

    /// HTTP bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// TMDB API base URL.
    pub tmdb_base_url: String,

    /// Party record TTL, refreshed on every save.
    pub session_ttl_seconds: u64,

    /// Party lock expiry. Must exceed `catalog_timeout_seconds`.
    pub lock_duration_seconds: u64,

    pub catalog_timeout_seconds: u64,

    /// Must be strictly less than `ws_read_timeout_seconds`.
    pub ws_ping_interval_seconds: u64,

    pub ws_read_timeout_seconds: u64,

    pub ws_max_message_bytes: usize,

    /// Reject votes arriving after a nomination resolved.
    pub strict_late_votes: bool,

    /// Seconds to wait after a shutdown signal before stopping the server.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("tmdb_api_key", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("tmdb_base_url", &self.tmdb_base_url)
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("lock_duration_seconds", &self.lock_duration_seconds)
            .field("catalog_timeout_seconds", &self.catalog_timeout_seconds)
            .field("ws_ping_interval_seconds", &self.ws_ping_interval_seconds)
            .field("ws_read_timeout_seconds", &self.ws_read_timeout_seconds)
            .field("ws_max_message_bytes", &self.ws_max_message_bytes)
            .field("strict_late_votes", &self.strict_late_votes)
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = SecretString::from(required(vars, "REDIS_URL")?);
        let tmdb_api_key = SecretString::from(required(vars, "TMDB_API_KEY")?);

        let bind_address = vars
            .get("PARTY_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let tmdb_base_url = vars
            .get("TMDB_BASE_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_TMDB_BASE_URL.to_string());

        let session_ttl_seconds =
            positive(vars, "PARTY_SESSION_TTL_SECONDS", DEFAULT_SESSION_TTL_SECONDS)?;
        let lock_duration_seconds =
            positive(vars, "PARTY_LOCK_DURATION_SECONDS", DEFAULT_LOCK_DURATION_SECONDS)?;
        let catalog_timeout_seconds =
            positive(vars, "PARTY_CATALOG_TIMEOUT_SECONDS", DEFAULT_CATALOG_TIMEOUT_SECONDS)?;
        let ws_ping_interval_seconds =
            positive(vars, "PARTY_WS_PING_INTERVAL_SECONDS", DEFAULT_WS_PING_INTERVAL_SECONDS)?;
        let ws_read_timeout_seconds =
            positive(vars, "PARTY_WS_READ_TIMEOUT_SECONDS", DEFAULT_WS_READ_TIMEOUT_SECONDS)?;
        let ws_max_message_bytes =
            positive(vars, "PARTY_WS_MAX_MESSAGE_BYTES", DEFAULT_WS_MAX_MESSAGE_BYTES)?;
        let strict_late_votes = parse_or(vars, "PARTY_STRICT_LATE_VOTES", false)?;
        let drain_seconds = parse_or(vars, "PARTY_DRAIN_SECONDS", 0)?;

        // A lock that can expire mid-catalog-call lets a second writer in.
        if lock_duration_seconds <= catalog_timeout_seconds {
            return Err(ConfigError::InvalidValue(format!(
                "PARTY_LOCK_DURATION_SECONDS ({lock_duration_seconds}) must be greater than \
                 PARTY_CATALOG_TIMEOUT_SECONDS ({catalog_timeout_seconds})"
            )));
        }

        if ws_ping_interval_seconds >= ws_read_timeout_seconds {
            return Err(ConfigError::InvalidValue(format!(
                "PARTY_WS_PING_INTERVAL_SECONDS ({ws_ping_interval_seconds}) must be less than \
                 PARTY_WS_READ_TIMEOUT_SECONDS ({ws_read_timeout_seconds})"
            )));
        }

        Ok(Config {
            redis_url,
            tmdb_api_key,
            bind_address,
            tmdb_base_url,
            session_ttl_seconds,
            lock_duration_seconds,
            catalog_timeout_seconds,
            ws_ping_interval_seconds,
            ws_read_timeout_seconds,
            ws_max_message_bytes,
            strict_late_votes,
            drain_seconds,
        })
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_seconds)
    }

    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog_timeout_seconds)
    }

    pub fn drain_period(&self) -> Duration {
        Duration::from_secs(self.drain_seconds)
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            lock_duration: Duration::from_secs(self.lock_duration_seconds),
            catalog_timeout: self.catalog_timeout(),
            strict_late_votes: self.strict_late_votes,
        }
    }

    pub fn hub_settings(&self) -> HubSettings {
        HubSettings {
            ping_interval: Duration::from_secs(self.ws_ping_interval_seconds),
            read_timeout: Duration::from_secs(self.ws_read_timeout_seconds),
            max_message_bytes: self.ws_max_message_bytes,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|value| !value.is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_or<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match vars.get(name) {
        Some(value) => value.trim().parse().map_err(|e| {
            ConfigError::InvalidValue(format!("{name} must be a valid value, got '{value}': {e}"))
        }),
        None => Ok(default),
    }
}

fn positive<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + Default + PartialEq,
    T::Err: fmt::Display,
{
    let value = parse_or(vars, name, default)?;
    if value == T::default() {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be greater than 0"
        )));
    }
    Ok(value)
}
