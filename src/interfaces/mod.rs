//! Abstract interfaces for sqljournal components.
//!
//! These traits define the contract between the journal/query layers and
//! the SQL backends that persist rows.

pub mod journal_dao;

pub use journal_dao::{JournalDao, Result, StorageError};
