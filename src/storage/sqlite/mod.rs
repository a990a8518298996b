//! SQLite journal backend.
//!
//! Connection bootstrap plus the dialect-native bulk insert: one prepared
//! single-row `INSERT ... RETURNING` per row inside the chunk transaction.
//! sqlx caches the prepared statement, so every row after the first reuses
//! it.

use std::path::Path;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::config::StorageConfig;
use crate::interfaces::{Result, StorageError};
use crate::storage::sql::sqlite::Sqlite;
use crate::storage::sql::{run, InsertedKey, SqlJournalDao};
use crate::storage::JournalRow;

impl SqlJournalDao<Sqlite> {
    /// Row-by-row insert for `BulkCopyMode::Default`.
    pub(crate) async fn native_insert(
        &self,
        conn: &mut SqliteConnection,
        chunk: &[JournalRow],
    ) -> Result<Vec<InsertedKey>> {
        let mut inserted = Vec::with_capacity(chunk.len());
        for row in chunk {
            let record = run!(
                Sqlite,
                self.queries().insert_rows(std::slice::from_ref(row)),
                self.uses_parameters(),
                fetch_one,
                &mut *conn
            )?;
            inserted.push(Self::inserted_key(&record)?);
        }
        Ok(inserted)
    }
}

/// Open a pool for the configured URI, creating the database directory for
/// file-backed databases.
pub async fn connect(config: &StorageConfig) -> Result<SqlitePool> {
    if let Some(parent) = database_dir(&config.uri) {
        std::fs::create_dir_all(parent)
            .map_err(|e| StorageError::Config(format!("cannot create {}: {}", parent.display(), e)))?;
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.uri)
        .await?;
    info!(uri = %config.uri, "Connected to SQLite journal");
    Ok(pool)
}

/// Directory holding a file-backed database, if any.
fn database_dir(uri: &str) -> Option<&Path> {
    let path = uri.strip_prefix("sqlite:")?;
    let path = path.strip_prefix("//").unwrap_or(path);
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path).parent().filter(|p| !p.as_os_str().is_empty())
}
