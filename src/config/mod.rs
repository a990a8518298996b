//! Application configuration.
//!
//! Aggregates storage, journal and query configuration into a single Config
//! struct that can be loaded from YAML files or environment variables.

mod journal;
mod query;
mod storage;

pub use journal::{DaoConfig, JournalConfig};
pub use query::ReadJournalConfig;
pub use storage::{StorageConfig, StorageType};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "SQLJOURNAL_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "SQLJOURNAL";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "SQLJOURNAL_LOG";

use serde::Deserialize;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection and schema bootstrap.
    pub storage: StorageConfig,
    /// Write path, deletion and tag layout.
    pub journal: JournalConfig,
    /// Live query polling.
    pub query: ReadJournalConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the journal cannot honour.
    pub fn validate(&self) -> Result<(), crate::StorageError> {
        if self.journal.dao.db_round_trip_batch_size == 0 {
            return Err(crate::StorageError::Config(
                "journal.dao.db_round_trip_batch_size must be at least 1".to_string(),
            ));
        }
        if self.query.batch_size == 0 {
            return Err(crate::StorageError::Config(
                "query.batch_size must be at least 1".to_string(),
            ));
        }
        if self.query.channel_capacity == 0 {
            return Err(crate::StorageError::Config(
                "query.channel_capacity must be at least 1".to_string(),
            ));
        }
        let write_mode = self.journal.tag_write_mode;
        let readable = match self.query.tag_read_mode {
            crate::storage::TagReadMode::Csv => write_mode.writes_csv(),
            crate::storage::TagReadMode::TagTable => write_mode.writes_tag_table(),
        };
        if !readable {
            return Err(crate::StorageError::Config(format!(
                "query.tag_read_mode {:?} reads a layout that journal.tag_write_mode {:?} never writes",
                self.query.tag_read_mode, write_mode
            )));
        }
        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}
