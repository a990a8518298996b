//! sqljournal - append-only SQL event journal
//!
//! Persists ordered event streams ("journals") keyed by persistence id and
//! sequence number, supports logical deletion with a per-stream high-water
//! mark, and serves range reads plus polling live queries (by persistence
//! id, by tag, all events, persistence ids).

pub mod config;
pub mod interfaces;
pub mod journal;
pub mod query;
pub mod storage;
pub mod utils;

pub use interfaces::{JournalDao, Result, StorageError};
pub use journal::SqlJournal;
pub use query::ReadJournal;
pub use storage::{BulkCopyResult, JournalMetaData, JournalRow, TagRow};
