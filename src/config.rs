//! Engine configuration
//!
//! Loaded from a JSON file (`cvl.json` by default). Only `schema_dir` is
//! required; every other field has a default.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::DEFAULT_KEY_DELIMITER;

/// Configuration load failure
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {reason}")]
    Unreadable { path: String, reason: String },

    #[error("invalid config JSON: {0}")]
    Malformed(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// A table the global cache populates at engine start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedTable {
    pub table: String,
    /// 0 means the entry never expires
    #[serde(default)]
    pub expiry_secs: u64,
}

/// Engine configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory of schema description files (required)
    pub schema_dir: PathBuf,

    /// Store DB index used in notification channel names
    #[serde(default = "default_db_index")]
    pub db_index: u32,

    /// Delimiter for tables that do not declare one
    #[serde(default = "default_key_delimiter")]
    pub key_delimiter: String,

    /// Keys per pipelined bulk fetch
    #[serde(default = "default_fetch_batch_size")]
    pub fetch_batch_size: usize,

    #[serde(default)]
    pub cached_tables: Vec<CachedTable>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_db_index() -> u32 {
    4
}
fn default_key_delimiter() -> String {
    DEFAULT_KEY_DELIMITER.to_string()
}
fn default_fetch_batch_size() -> usize {
    100
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

impl EngineConfig {
    /// Configuration with defaults for everything but the schema directory.
    pub fn new(schema_dir: impl Into<PathBuf>) -> Self {
        Self {
            schema_dir: schema_dir.into(),
            db_index: default_db_index(),
            key_delimiter: default_key_delimiter(),
            fetch_batch_size: default_fetch_batch_size(),
            cached_tables: Vec::new(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }

    /// Adds a table to populate in the global cache at start.
    pub fn cache_table(mut self, table: impl Into<String>, expiry_secs: u64) -> Self {
        self.cached_tables.push(CachedTable {
            table: table.into(),
            expiry_secs,
        });
        self
    }

    pub fn with_fetch_batch_size(mut self, size: usize) -> Self {
        self.fetch_batch_size = size;
        self
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut config: EngineConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Malformed(e.to_string()))?;

        // Relative schema directories resolve against the config file
        if config.schema_dir.is_relative() {
            if let Some(parent) = path.parent() {
                config.schema_dir = parent.join(&config.schema_dir);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.schema_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("schema_dir must not be empty".into()));
        }

        if self.fetch_batch_size == 0 {
            return Err(ConfigError::Invalid("fetch_batch_size must be > 0".into()));
        }

        if self.key_delimiter.is_empty() {
            return Err(ConfigError::Invalid("key_delimiter must not be empty".into()));
        }

        match self.log_format.as_str() {
            "compact" | "json" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "Invalid log_format: '{}'. Expected 'compact' or 'json'.",
                    other
                )))
            }
        }

        for cached in &self.cached_tables {
            if cached.table.is_empty() {
                return Err(ConfigError::Invalid("cached table name must not be empty".into()));
            }
        }

        Ok(())
    }
}
