//! Application state management

use std::path::{Path, PathBuf};

use attendmax_core::{config, AttendanceService, Config, Database, Result};
use tracing::debug;

/// Opened store plus the configuration it was opened with
pub struct AppState {
    pub db: Database,
    pub config: Config,
}

impl AppState {
    /// Load configuration (from `config_path` or the data directory) and open
    /// the database it points at.
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path()?,
        };
        let config = Config::load(&config_path)?;
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let db_path = config.database_path()?;

        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        debug!(path = %db_path.display(), "Opening database");
        let db = Database::open_with_timeout(&db_path, config.busy_timeout())?;

        Ok(Self { db, config })
    }

    pub fn default_config_path() -> Result<PathBuf> {
        Ok(config::data_dir()?.join("config.toml"))
    }

    pub fn service(&self) -> AttendanceService<'_, Database> {
        AttendanceService::new(&self.db, self.config.clone())
    }
}
