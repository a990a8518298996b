//! Row model for the journal, metadata and tag tables.

/// One persisted event.
///
/// `ordering` is assigned by storage on insert; rows built for writing carry
/// `0` until read back. `tags` is the logical tag set. How it lands on disk
/// (inline column, tag table, or both) is decided by the configured tag
/// mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JournalRow {
    pub ordering: i64,
    pub persistence_id: String,
    pub sequence_number: i64,
    pub deleted: bool,
    /// Epoch milliseconds, assigned by the writer.
    pub timestamp: i64,
    /// Opaque serialized payload.
    pub message: Vec<u8>,
    pub manifest: String,
    /// Serializer identifier.
    pub identifier: Option<i32>,
    pub writer_uuid: String,
    pub tags: Vec<String>,
}

impl JournalRow {
    /// Create a row ready to append. Timestamp defaults to now.
    pub fn new(persistence_id: impl Into<String>, sequence_number: i64, message: Vec<u8>) -> Self {
        Self {
            persistence_id: persistence_id.into(),
            sequence_number,
            message,
            timestamp: chrono::Utc::now().timestamp_millis(),
            ..Default::default()
        }
    }

    pub fn with_manifest(mut self, manifest: impl Into<String>) -> Self {
        self.manifest = manifest.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_identifier(mut self, identifier: i32) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn with_writer_uuid(mut self, writer_uuid: impl Into<String>) -> Self {
        self.writer_uuid = writer_uuid.into();
        self
    }
}

/// Per-stream high-water mark of deleted sequence numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalMetaData {
    pub persistence_id: String,
    pub sequence_number: i64,
}

/// One (journal row, tag) pair under the tag-table layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub journal_ordering: i64,
    pub tag: String,
}

/// Outcome of a bulk insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkCopyResult {
    pub rows_copied: u64,
}
