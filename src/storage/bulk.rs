//! Bulk insert planning.
//!
//! Decides how many rows go into one statement. The configured round-trip
//! batch size is an upper bound; when values are bound as parameters the
//! dialect's bind-parameter ceiling caps it further.

use serde::Deserialize;

/// Statement shape used for bulk inserts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkCopyMode {
    /// Dialect-native bulk path (row-by-row prepared inserts on SQLite,
    /// `UNNEST` array insert on PostgreSQL).
    #[default]
    Default,
    /// One multi-value `INSERT ... VALUES (..), (..)` per chunk.
    MultipleRows,
}

/// Rows per statement for a bulk insert.
///
/// Always at least 1 so a single oversized row still goes through.
pub fn rows_per_statement(
    batch_size: usize,
    uses_parameters: bool,
    max_bind_parameters: usize,
    columns_per_row: usize,
) -> usize {
    let mut rows = batch_size.max(1);
    if uses_parameters && columns_per_row > 0 {
        rows = rows.min(max_bind_parameters / columns_per_row);
    }
    rows.max(1)
}
