//! Storage configuration types.

use serde::Deserialize;

/// Storage type discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Sqlite,
    Postgres,
}

/// Connection and schema bootstrap configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// Connection URI for the selected backend.
    pub uri: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// Create the journal, metadata and tag tables if missing.
    pub auto_initialize: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Sqlite,
            uri: "sqlite:./data/journal.db?mode=rwc".to_string(),
            max_connections: 10,
            auto_initialize: true,
        }
    }
}
