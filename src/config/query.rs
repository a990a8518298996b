//! Read journal (live query) configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::storage::TagReadMode;

/// Live query configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadJournalConfig {
    /// Pause between polls that found nothing. Default: 1000ms.
    pub refresh_interval_ms: u64,
    /// Rows fetched per poll. Default: 500.
    pub batch_size: u64,
    /// Tag layout queried by tag subscriptions. Default: `tagtable`.
    pub tag_read_mode: TagReadMode,
    /// Polls an ordering gap may hold back delivery before it is treated
    /// as permanent. 0 disables gap tracking. Default: 10.
    pub ordering_gap_max_polls: u32,
    /// Rows buffered between a poll loop and its consumer. Default: 128.
    pub channel_capacity: usize,
}

impl Default for ReadJournalConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1000,
            batch_size: 500,
            tag_read_mode: TagReadMode::TagTable,
            ordering_gap_max_polls: 10,
            channel_capacity: 128,
        }
    }
}

impl ReadJournalConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}
