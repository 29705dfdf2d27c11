//! Server configuration.
//!
//! Values resolve in order: command line or environment, then the optional
//! TOML file, then built-in defaults.

use std::path::Path;
use std::time::Duration;

use derive_getters::Getters;
use derive_more::{Display, Error};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_DATABASE_URL: &str = "duel.db";
const DEFAULT_JWT_TTL_HOURS: i64 = 24 * 7;
const DEFAULT_ROOM_TTL_SECS: u64 = 30 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Contents of the optional `duel.toml`. Every key may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Bind address.
    pub host: Option<String>,
    /// Bind port.
    pub port: Option<u16>,
    /// SQLite database path.
    pub database_url: Option<String>,
    /// HS256 signing secret.
    pub jwt_secret: Option<String>,
    /// Token lifetime.
    pub jwt_ttl_hours: Option<i64>,
    /// Age after which a room is evicted.
    pub room_ttl_secs: Option<u64>,
    /// Idle sweep period.
    pub sweep_interval_secs: Option<u64>,
    /// Allowed CORS origins. Empty allows any.
    pub cors_origins: Option<Vec<String>>,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;

        info!("Config file loaded");
        Ok(config)
    }
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Bind address.
    pub host: Option<String>,
    /// Bind port.
    pub port: Option<u16>,
    /// SQLite database path.
    pub database_url: Option<String>,
    /// HS256 signing secret.
    pub jwt_secret: Option<String>,
    /// Token lifetime.
    pub jwt_ttl_hours: Option<i64>,
    /// Age after which a room is evicted.
    pub room_ttl_secs: Option<u64>,
    /// Idle sweep period.
    pub sweep_interval_secs: Option<u64>,
    /// Comma-separated CORS origins.
    pub cors_origins: Option<String>,
}

/// Fully resolved server configuration.
#[derive(Clone, Getters)]
pub struct ServerConfig {
    host: String,
    port: u16,
    database_url: String,
    jwt_secret: String,
    jwt_ttl_hours: i64,
    room_ttl: Duration,
    sweep_interval: Duration,
    cors_origins: Vec<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &self.database_url)
            .field("jwt_ttl_hours", &self.jwt_ttl_hours)
            .field("room_ttl", &self.room_ttl)
            .field("sweep_interval", &self.sweep_interval)
            .field("cors_origins", &self.cors_origins)
            .finish_non_exhaustive()
    }
}

impl ServerConfig {
    /// Merges overrides over the file over defaults.
    ///
    /// A missing JWT secret is replaced by a random one, so tokens do not
    /// survive a restart.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a duration is zero or the database path is blank.
    #[instrument(skip_all)]
    pub fn resolve(file: FileConfig, overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let database_url = overrides
            .database_url
            .or(file.database_url)
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        if database_url.trim().is_empty() {
            return Err(ConfigError::new("Database URL must not be empty"));
        }

        let jwt_secret = match overrides.jwt_secret.or(file.jwt_secret) {
            Some(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("No JWT secret configured, generating an ephemeral one");
                random_secret()
            }
        };

        let room_ttl_secs = overrides
            .room_ttl_secs
            .or(file.room_ttl_secs)
            .unwrap_or(DEFAULT_ROOM_TTL_SECS);
        let sweep_interval_secs = overrides
            .sweep_interval_secs
            .or(file.sweep_interval_secs)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
        if room_ttl_secs == 0 || sweep_interval_secs == 0 {
            return Err(ConfigError::new("Room TTL and sweep interval must be positive"));
        }

        let cors_origins = match overrides.cors_origins {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(str::to_string)
                .collect(),
            None => file.cors_origins.unwrap_or_default(),
        };

        let config = Self {
            host: overrides
                .host
                .or(file.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: overrides.port.or(file.port).unwrap_or(DEFAULT_PORT),
            database_url,
            jwt_secret,
            jwt_ttl_hours: overrides
                .jwt_ttl_hours
                .or(file.jwt_ttl_hours)
                .unwrap_or(DEFAULT_JWT_TTL_HOURS),
            room_ttl: Duration::from_secs(room_ttl_secs),
            sweep_interval: Duration::from_secs(sweep_interval_secs),
            cors_origins,
        };
        debug!(?config, "Configuration resolved");
        Ok(config)
    }

    /// Bind address as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
