//! Shared storage integration tests.
//!
//! Tests the JournalDao contract against every SQL backend. Each backend's
//! test binary imports these functions and runs them through
//! `run_journal_dao_tests!`.

pub mod journal_dao_tests;
