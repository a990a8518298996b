//! Journal (write side) configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::storage::{BulkCopyMode, TagMode};

/// Bulk insert tuning.
///
/// Both knobs exist because backends differ in statement-size and
/// bind-parameter ceilings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaoConfig {
    /// Statement shape for bulk inserts. Default: `default` (dialect-native).
    pub bulk_copy_mode: BulkCopyMode,
    /// Maximum rows per round trip. Default: 1000.
    pub db_round_trip_batch_size: usize,
    /// Bind values as parameters instead of rendering literals. Default: true.
    pub prefer_parameters_on_multi_row_insert: bool,
}

impl Default for DaoConfig {
    fn default() -> Self {
        Self {
            bulk_copy_mode: BulkCopyMode::Default,
            db_round_trip_batch_size: 1000,
            prefer_parameters_on_multi_row_insert: true,
        }
    }
}

/// Journal configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    pub dao: DaoConfig,
    /// Tag layouts populated on write. Default: `tagtable`.
    pub tag_write_mode: TagMode,
    /// Separator for the inline tag column. Must not occur inside tags.
    pub tag_separator: char,
    /// When false, deleted rows below the high-water mark are physically
    /// removed after being flagged. Default: true.
    pub logical_delete: bool,
    /// Consult the metadata table in max sequence number lookups.
    /// Default: true.
    pub sequence_number_compatibility_mode: bool,
    /// Permit the legacy in-place payload update. Default: false.
    pub allow_payload_update: bool,
    /// Deadline applied when a caller passes none. Default: none.
    pub operation_timeout_ms: Option<u64>,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            dao: DaoConfig::default(),
            tag_write_mode: TagMode::TagTable,
            tag_separator: ';',
            logical_delete: true,
            sequence_number_compatibility_mode: true,
            allow_payload_update: false,
            operation_timeout_ms: None,
        }
    }
}

impl JournalConfig {
    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }
}
