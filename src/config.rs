//! Process-wide configuration
//!
//! Defaults come from `MYSTIC_*` environment variables and are overridable
//! programmatically. Invalid environments or uncreatable directories are
//! fatal at init ([`MysticConfig::validate`]).

use crate::error::{MysticError, Result};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Deployment environment tag, consulted by the Mock strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Testing,
    Production,
}

impl Environment {
    /// Lowercase name as used in env vars and MCP payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Testing => "testing",
            Self::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = MysticError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "testing" | "test" => Ok(Self::Testing),
            "production" | "prod" => Ok(Self::Production),
            other => Err(MysticError::config(format!("Unknown environment '{other}'"))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event formatting mode for the call logger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, for terminals
    Console,
    /// Human-readable, rotating file sink
    File,
    /// One JSON object per event
    JsonRpc,
    /// key=value pairs
    Structured,
    /// Indented JSON with direction arrows
    McpDebug,
}

impl FromStr for LogFormat {
    type Err = MysticError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "console" => Ok(Self::Console),
            "file" => Ok(Self::File),
            "json_rpc" | "jsonrpc" => Ok(Self::JsonRpc),
            "structured" => Ok(Self::Structured),
            "mcp_debug" => Ok(Self::McpDebug),
            other => Err(MysticError::config(format!("Unknown log format '{other}'"))),
        }
    }
}

/// Process-wide configuration for the control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MysticConfig {
    /// Environment tag
    pub environment: Environment,
    /// Directory for the disk-backed call cache
    pub cache_dir: PathBuf,
    /// Directory for rotating log files
    pub log_dir: PathBuf,
    /// Directory for snapshot exports and other data
    pub data_dir: PathBuf,
    /// In-memory cache capacity per cache strategy
    pub max_cache_entries: usize,
    /// Snapshot timeline capacity
    pub max_snapshots: usize,
    /// Event formatting mode
    pub log_format: LogFormat,
    /// Apply the redactor to logged payloads
    pub filter_sensitive: bool,
    /// Enable memory sampling in the performance tracker
    pub profile_mode: bool,
}

impl Default for MysticConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            cache_dir: PathBuf::from(".mystic/cache"),
            log_dir: PathBuf::from(".mystic/logs"),
            data_dir: PathBuf::from(".mystic/data"),
            max_cache_entries: 1000,
            max_snapshots: 1000,
            log_format: LogFormat::Console,
            filter_sensitive: true,
            profile_mode: false,
        }
    }
}

impl MysticConfig {
    /// Build a configuration from `MYSTIC_*` environment variables.
    ///
    /// Unset variables fall back to defaults; a malformed
    /// `MYSTIC_ENVIRONMENT` is a `ConfigError`.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(env) = std::env::var("MYSTIC_ENVIRONMENT") {
            config.environment = env.parse()?;
        }
        if let Ok(dir) = std::env::var("MYSTIC_CACHE_DIR") {
            config.cache_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("MYSTIC_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("MYSTIC_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(flag) = std::env::var("MYSTIC_FILTER_SENSITIVE") {
            config.filter_sensitive = parse_bool(&flag);
        }
        Ok(config)
    }

    /// Set the environment tag
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Set the cache directory
    pub fn with_cache_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.cache_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the log directory
    pub fn with_log_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.log_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the data directory
    pub fn with_data_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the log format
    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Toggle sensitive-data filtering
    pub fn with_filter_sensitive(mut self, on: bool) -> Self {
        self.filter_sensitive = on;
        self
    }

    /// Toggle memory sampling
    pub fn with_profile_mode(mut self, on: bool) -> Self {
        self.profile_mode = on;
        self
    }

    /// Create the configured directories, failing with `ConfigError` when
    /// any of them cannot be created.
    pub fn validate(&self) -> Result<()> {
        for dir in [&self.cache_dir, &self.log_dir, &self.data_dir] {
            std::fs::create_dir_all(dir).map_err(|e| {
                MysticError::config(format!("Cannot create directory {}: {e}", dir.display()))
            })?;
        }
        if self.max_cache_entries == 0 {
            return Err(MysticError::config("max_cache_entries must be nonzero"));
        }
        if self.max_snapshots == 0 {
            return Err(MysticError::config("max_snapshots must be nonzero"));
        }
        Ok(())
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

static CONFIG: Lazy<RwLock<MysticConfig>> =
    Lazy::new(|| RwLock::new(MysticConfig::from_env().unwrap_or_default()));

/// Read a clone of the process-wide configuration
pub fn config() -> MysticConfig {
    CONFIG.read().clone()
}

/// Replace the process-wide configuration
pub fn set_config(config: MysticConfig) {
    *CONFIG.write() = config;
}

/// The current environment tag
pub fn environment() -> Environment {
    CONFIG.read().environment
}

/// Whether memory sampling is enabled
pub fn profile_mode() -> bool {
    CONFIG.read().profile_mode
}

/// Switch the process-wide environment tag
pub fn set_environment(environment: Environment) {
    CONFIG.write().environment = environment;
}
