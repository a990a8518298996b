//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query
//! building, plus the DDL used when `auto_initialize` is enabled.

use sea_query::Iden;

/// Journal table schema.
#[derive(Iden, Clone, Copy)]
pub enum Journal {
    Table,
    #[iden = "ordering"]
    Ordering,
    #[iden = "created"]
    Created,
    #[iden = "persistence_id"]
    PersistenceId,
    #[iden = "sequence_number"]
    SequenceNumber,
    #[iden = "deleted"]
    Deleted,
    #[iden = "tags"]
    Tags,
    #[iden = "message"]
    Message,
    #[iden = "identifier"]
    Identifier,
    #[iden = "manifest"]
    Manifest,
    #[iden = "writer_uuid"]
    WriterUuid,
}

/// Columns written on insert, in bind order. `ordering` is storage-assigned.
pub const JOURNAL_INSERT_COLUMNS: [Journal; 9] = [
    Journal::Created,
    Journal::PersistenceId,
    Journal::SequenceNumber,
    Journal::Deleted,
    Journal::Tags,
    Journal::Message,
    Journal::Identifier,
    Journal::Manifest,
    Journal::WriterUuid,
];

/// Columns read back into a `JournalRow`.
pub const JOURNAL_SELECT_COLUMNS: [Journal; 10] = [
    Journal::Ordering,
    Journal::Created,
    Journal::PersistenceId,
    Journal::SequenceNumber,
    Journal::Deleted,
    Journal::Tags,
    Journal::Message,
    Journal::Identifier,
    Journal::Manifest,
    Journal::WriterUuid,
];

/// Journal metadata table schema.
#[derive(Iden, Clone, Copy)]
pub enum JournalMetadata {
    Table,
    #[iden = "persistence_id"]
    PersistenceId,
    #[iden = "sequence_number"]
    SequenceNumber,
}

/// Tag table schema.
#[derive(Iden, Clone, Copy)]
pub enum Tags {
    Table,
    #[iden = "ordering_id"]
    OrderingId,
    #[iden = "tag"]
    Tag,
}

/// Scalar function names that differ between dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlFunctions {
    /// `(haystack, needle)`: 1-based, case-sensitive position or 0.
    pub position: &'static str,
    /// Larger of two values.
    pub greatest: &'static str,
}

pub const SQLITE_FUNCTIONS: SqlFunctions = SqlFunctions {
    position: "instr",
    greatest: "max",
};

pub const POSTGRES_FUNCTIONS: SqlFunctions = SqlFunctions {
    position: "strpos",
    greatest: "GREATEST",
};

/// SQLite DDL for the journal, metadata and tag tables.
pub const SQLITE_CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS journal (
    ordering INTEGER PRIMARY KEY AUTOINCREMENT,
    created INTEGER NOT NULL,
    persistence_id TEXT NOT NULL,
    sequence_number INTEGER NOT NULL,
    deleted INTEGER NOT NULL DEFAULT 0,
    tags TEXT NULL,
    message BLOB NOT NULL,
    identifier INTEGER NULL,
    manifest TEXT NOT NULL,
    writer_uuid TEXT NOT NULL,
    UNIQUE (persistence_id, sequence_number)
);

CREATE INDEX IF NOT EXISTS idx_journal_persistence_id ON journal(persistence_id, sequence_number);

CREATE TABLE IF NOT EXISTS journal_metadata (
    persistence_id TEXT NOT NULL PRIMARY KEY,
    sequence_number INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    ordering_id INTEGER NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (ordering_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags(tag, ordering_id);
"#;

/// PostgreSQL DDL for the journal, metadata and tag tables.
pub const POSTGRES_CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS journal (
    ordering BIGSERIAL PRIMARY KEY,
    created BIGINT NOT NULL,
    persistence_id TEXT NOT NULL,
    sequence_number BIGINT NOT NULL,
    deleted BOOLEAN NOT NULL DEFAULT FALSE,
    tags TEXT NULL,
    message BYTEA NOT NULL,
    identifier INTEGER NULL,
    manifest TEXT NOT NULL,
    writer_uuid TEXT NOT NULL,
    UNIQUE (persistence_id, sequence_number)
);

CREATE TABLE IF NOT EXISTS journal_metadata (
    persistence_id TEXT NOT NULL PRIMARY KEY,
    sequence_number BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS tags (
    ordering_id BIGINT NOT NULL,
    tag TEXT NOT NULL,
    PRIMARY KEY (ordering_id, tag)
);

CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags(tag, ordering_id);
"#;
