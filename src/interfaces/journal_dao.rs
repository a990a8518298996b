//! Journal storage interface.

use std::time::Duration;

use async_trait::async_trait;

use crate::storage::{BulkCopyResult, JournalRow};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
///
/// Absence is not an error: lookups return `Option` and range reads return
/// an empty `Vec` when nothing matches.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Transport or connectivity failure. Retryable by the caller.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Duplicate key or other constraint failure. Signals a sequencing bug
    /// on the caller side and is never retryable.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// A bulk insert stored fewer rows than were submitted.
    #[error("Partial batch failure: {copied} of {submitted} rows copied: {reason}")]
    PartialBatchFailure {
        copied: u64,
        submitted: u64,
        reason: String,
    },

    /// Caller-supplied deadline exceeded.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl StorageError {
    /// Whether the caller may retry the failed operation (with backoff).
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Connection(_) | StorageError::Timeout(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StorageError::Connection(err.to_string()),
            sqlx::Error::Database(db_err) => match db_err.kind() {
                sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation
                | sqlx::error::ErrorKind::NotNullViolation
                | sqlx::error::ErrorKind::CheckViolation => {
                    StorageError::ConstraintViolation(db_err.message().to_string())
                }
                _ => StorageError::Database(sqlx::Error::Database(db_err)),
            },
            other => StorageError::Database(other),
        }
    }
}

/// Data access for the journal tables.
///
/// This is the abstract SQL capability the journal and query layers are
/// written against. Implementations:
/// - `SqlJournalDao<Sqlite>`: SQLite storage
/// - `SqlJournalDao<Postgres>`: PostgreSQL storage
/// - `MockJournalDao`: In-memory mock for testing
///
/// Only `append_batch` creates rows. The other mutating operations flip the
/// deleted flag, maintain the metadata row, or (legacy) rewrite a payload;
/// none of them change `ordering`.
#[async_trait]
pub trait JournalDao: Send + Sync {
    /// Persist rows in input order, as one or more bulk inserts.
    ///
    /// `ordering` is assigned by storage in input order. Rows may belong to
    /// several persistence ids. No retry is attempted on failure.
    async fn append_batch(&self, rows: Vec<JournalRow>) -> Result<BulkCopyResult>;

    /// Non-deleted rows with `from <= sequence_number <= to`, ascending.
    async fn select_range(
        &self,
        persistence_id: &str,
        from: i64,
        to: i64,
        limit: Option<u64>,
    ) -> Result<Vec<JournalRow>>;

    /// Highest sequence number `>= min_sequence_number` (default 0).
    ///
    /// In compatibility mode the metadata high-water mark is considered as
    /// well. Returns `None` when the stream has no matching rows.
    async fn max_sequence_number(
        &self,
        persistence_id: &str,
        min_sequence_number: Option<i64>,
    ) -> Result<Option<i64>>;

    /// Flag every row with `sequence_number <= to` as deleted in one UPDATE.
    async fn mark_deleted(&self, persistence_id: &str, to_sequence_nr: i64) -> Result<u64>;

    /// Highest sequence number currently flagged deleted.
    async fn max_marked_for_deletion(&self, persistence_id: &str) -> Result<Option<i64>>;

    /// The metadata high-water mark, if one was ever recorded.
    async fn metadata_high_water_mark(&self, persistence_id: &str) -> Result<Option<i64>>;

    /// Upsert the metadata row. An existing mark is only ever raised: the
    /// stored value becomes the larger of the two.
    async fn record_high_water_mark(&self, persistence_id: &str, sequence_nr: i64) -> Result<()>;

    /// Physically remove rows with `sequence_number <= to`.
    async fn purge_up_to(&self, persistence_id: &str, to_sequence_nr: i64) -> Result<u64>;

    /// Legacy in-place payload rewrite of a single row.
    async fn update_payload(
        &self,
        persistence_id: &str,
        sequence_nr: i64,
        message: Vec<u8>,
    ) -> Result<u64>;

    /// Non-deleted rows with `after < ordering <= up_to`, ascending by ordering.
    async fn rows_by_ordering(&self, after: i64, up_to: i64, limit: u64)
        -> Result<Vec<JournalRow>>;

    /// Non-deleted rows carrying `tag` with `after < ordering <= up_to`,
    /// ascending by ordering.
    async fn rows_for_tag(
        &self,
        tag: &str,
        after: i64,
        up_to: i64,
        limit: u64,
    ) -> Result<Vec<JournalRow>>;

    /// Distinct persistence ids with a row in `(after, up_to]`, each paired
    /// with its highest ordering in that window, ascending by that ordering.
    /// Deleted rows count: a stream exists once written.
    async fn persistence_ids_after(
        &self,
        after: i64,
        up_to: i64,
        limit: u64,
    ) -> Result<Vec<(String, i64)>>;

    /// Highest ordering currently visible, deleted rows included.
    async fn max_ordering(&self) -> Result<Option<i64>>;

    /// The lowest `limit` visible orderings in `(after, up_to]`, ascending,
    /// deleted rows included.
    async fn orderings_between(&self, after: i64, up_to: i64, limit: u64) -> Result<Vec<i64>>;
}
