//! Runtime configuration
//!
//! Loaded from an optional TOML file; every field has a default so an
//! absent file is a valid configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default token validity window in seconds
pub const DEFAULT_VALIDITY_SECONDS: u32 = 15;

/// Default student history range in days
pub const DEFAULT_HISTORY_DAYS: u32 = 30;

/// Default SQLite busy timeout in milliseconds
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file; defaults to the platform data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// How long a connection waits on a locked database before giving up
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_validity_seconds")]
    pub validity_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_days")]
    pub default_days: u32,
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

fn default_validity_seconds() -> u32 {
    DEFAULT_VALIDITY_SECONDS
}

fn default_history_days() -> u32 {
    DEFAULT_HISTORY_DAYS
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            validity_seconds: DEFAULT_VALIDITY_SECONDS,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_days: DEFAULT_HISTORY_DAYS,
        }
    }
}

impl Config {
    /// Load configuration from a file, falling back to defaults if it is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tokens.validity_seconds == 0 {
            return Err(Error::Validation(
                "tokens.validity_seconds must be positive".to_string(),
            ));
        }
        if self.history.default_days == 0 {
            return Err(Error::Validation(
                "history.default_days must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Token validity window
    pub fn validity_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.tokens.validity_seconds))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    /// Resolve the database path, using the platform data directory if unset
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database.path {
            Some(path) => Ok(path.clone()),
            None => Ok(data_dir()?.join("attendmax.db")),
        }
    }
}

/// Platform data directory for AttendMax
pub fn data_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("dev", "onyx", "attendmax").ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not determine data directory",
        ))
    })?;

    Ok(dirs.data_dir().to_path_buf())
}
