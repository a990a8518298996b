//! Storage implementations.

use std::sync::Arc;

use tracing::info;

use crate::config::{Config, StorageType};
use crate::interfaces::{JournalDao, Result};

pub mod bulk;
pub mod queries;
pub mod row;
pub mod schema;
pub mod sql;
pub mod tags;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use bulk::BulkCopyMode;
pub use queries::JournalQueries;
pub use row::{BulkCopyResult, JournalMetaData, JournalRow, TagRow};
pub use sql::{SqlDatabase, SqlJournalDao};
pub use tags::{TagIndex, TagMode, TagReadMode};

#[cfg(feature = "sqlite")]
pub use sql::sqlite::SqliteJournalDao;

#[cfg(feature = "postgres")]
pub use sql::postgres::PostgresJournalDao;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockJournalDao;

/// Initialize storage based on configuration.
///
/// Connects the pool for the configured backend, creates the journal tables
/// when `auto_initialize` is set, and returns the DAO.
pub async fn init_storage(config: &Config) -> Result<Arc<dyn JournalDao>> {
    config.validate()?;
    info!(storage_type = ?config.storage.storage_type, "Initializing journal storage");

    match config.storage.storage_type {
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            let pool = sqlite::connect(&config.storage).await?;
            let dao = SqliteJournalDao::new(pool, config.journal.clone(), config.query.tag_read_mode);
            if config.storage.auto_initialize {
                dao.init().await?;
            }
            Ok(Arc::new(dao))
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err(crate::interfaces::StorageError::Config("sqlite feature not enabled".to_string()))
        }
        #[cfg(feature = "postgres")]
        StorageType::Postgres => {
            let pool = postgres::connect(&config.storage).await?;
            let dao =
                PostgresJournalDao::new(pool, config.journal.clone(), config.query.tag_read_mode);
            if config.storage.auto_initialize {
                dao.init().await?;
            }
            Ok(Arc::new(dao))
        }
        #[cfg(not(feature = "postgres"))]
        StorageType::Postgres => {
            tracing::error!("PostgreSQL storage requested but 'postgres' feature is not enabled");
            Err(crate::interfaces::StorageError::Config("postgres feature not enabled".to_string()))
        }
    }
}
