//! Server configuration loaded from TOML.

use std::path::Path;

use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::player::MAX_STAT_POINTS;
use crate::protocol::DEFAULT_MAX_LINE_LENGTH;

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 5050;

/// Default capacity of the transport-to-session batch queue.
pub const DEFAULT_BATCH_QUEUE_DEPTH: usize = 32;

/// Server configuration.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_", into)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    host: String,

    /// Port to bind; 0 lets the OS pick.
    port: u16,

    /// SQLite database path.
    database: String,

    /// Keep players in memory only.
    ephemeral: bool,

    /// Budget shared by attack, defense and regen.
    max_stat_points: u32,

    /// Report unparseable values as MALFORMED_VALUE instead of
    /// INCORRECT_STATE.
    report_malformed_values: bool,

    /// Longest inbound line accepted, in bytes.
    max_line_length: usize,

    /// Batches buffered between a transport and its session.
    batch_queue_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            database: "lurk_server.db".to_string(),
            ephemeral: false,
            max_stat_points: MAX_STAT_POINTS,
            report_malformed_values: false,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            batch_queue_depth: DEFAULT_BATCH_QUEUE_DEPTH,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config = Self::from_toml(&content)?;
        info!(host = %config.host, port = config.port, "Config loaded successfully");
        Ok(config)
    }

    /// Parses configuration from TOML text and validates it.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the server cannot run with.
    #[instrument(skip(self))]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_line_length == 0 {
            return Err(ConfigError::new("max_line_length must be positive"));
        }
        if self.batch_queue_depth == 0 {
            return Err(ConfigError::new("batch_queue_depth must be positive"));
        }
        Ok(())
    }

    /// `host:port` string for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

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
