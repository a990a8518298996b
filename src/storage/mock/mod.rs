//! Mock storage implementations for testing.

mod journal_dao;

pub use journal_dao::MockJournalDao;
