//! Tag index strategies.
//!
//! Tags are stored in one of two layouts, selectable per deployment:
//!
//! - **csv**: an inline delimited column on the journal row (`;a;b;`).
//!   Cheap to write, no join on read, matched by a case-sensitive
//!   substring search for the anchored tag.
//! - **tagtable**: one `(ordering_id, tag)` row per tag. Precise equality
//!   match at the cost of an extra insert per tag and a join on read.
//!
//! Writers may also use `both` so readers can be migrated between layouts.
//! Both read strategies implement [`TagIndex`] and return identical rows.

use sea_query::{Alias, Expr, Func, Order, Query, SelectStatement};
use serde::Deserialize;

use super::schema::{Journal, SqlFunctions, Tags, JOURNAL_SELECT_COLUMNS};
use super::TagRow;
use crate::interfaces::{Result, StorageError};

/// Which layouts a writer populates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    Csv,
    #[default]
    TagTable,
    Both,
}

impl TagMode {
    pub fn writes_csv(self) -> bool {
        matches!(self, TagMode::Csv | TagMode::Both)
    }

    pub fn writes_tag_table(self) -> bool {
        matches!(self, TagMode::TagTable | TagMode::Both)
    }
}

/// Which layout a reader queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagReadMode {
    Csv,
    #[default]
    TagTable,
}

/// Read strategy for tag queries.
pub trait TagIndex: Send + Sync {
    /// Select non-deleted journal rows carrying `tag` with
    /// `after < ordering <= up_to`, ascending by ordering.
    fn select_for_tag(&self, tag: &str, after: i64, up_to: i64, limit: u64) -> SelectStatement;
}

/// Inline delimited-column layout.
///
/// `LIKE` folds ASCII case on SQLite, so membership is tested with the
/// dialect's position function instead. A `NULL` column never matches.
#[derive(Debug, Clone, Copy)]
pub struct CsvTagIndex {
    separator: char,
    functions: SqlFunctions,
}

impl CsvTagIndex {
    pub fn new(separator: char, functions: SqlFunctions) -> Self {
        Self {
            separator,
            functions,
        }
    }
}

impl TagIndex for CsvTagIndex {
    fn select_for_tag(&self, tag: &str, after: i64, up_to: i64, limit: u64) -> SelectStatement {
        let position = Func::cust(Alias::new(self.functions.position))
            .arg(Expr::col(Journal::Tags))
            .arg(csv_needle(tag, self.separator));
        Query::select()
            .columns(JOURNAL_SELECT_COLUMNS)
            .from(Journal::Table)
            .and_where(Expr::expr(position).gt(0))
            .and_where(Expr::col(Journal::Ordering).gt(after))
            .and_where(Expr::col(Journal::Ordering).lte(up_to))
            .and_where(Expr::col(Journal::Deleted).eq(false))
            .order_by(Journal::Ordering, Order::Asc)
            .limit(limit)
            .to_owned()
    }
}

/// Join-table layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagTableIndex;

impl TagIndex for TagTableIndex {
    fn select_for_tag(&self, tag: &str, after: i64, up_to: i64, limit: u64) -> SelectStatement {
        Query::select()
            .columns(JOURNAL_SELECT_COLUMNS.map(|c| (Journal::Table, c)))
            .from(Journal::Table)
            .inner_join(
                Tags::Table,
                Expr::col((Tags::Table, Tags::OrderingId)).equals((Journal::Table, Journal::Ordering)),
            )
            .and_where(Expr::col((Tags::Table, Tags::Tag)).eq(tag))
            .and_where(Expr::col((Journal::Table, Journal::Ordering)).gt(after))
            .and_where(Expr::col((Journal::Table, Journal::Ordering)).lte(up_to))
            .and_where(Expr::col((Journal::Table, Journal::Deleted)).eq(false))
            .order_by((Journal::Table, Journal::Ordering), Order::Asc)
            .limit(limit)
            .to_owned()
    }
}

/// Build the read strategy for a configured read mode.
pub fn tag_index(
    mode: TagReadMode,
    separator: char,
    functions: SqlFunctions,
) -> Box<dyn TagIndex> {
    match mode {
        TagReadMode::Csv => Box::new(CsvTagIndex::new(separator, functions)),
        TagReadMode::TagTable => Box::new(TagTableIndex),
    }
}

/// Reject tags that would break the inline encoding or match nothing.
pub fn validate_tags(tags: &[String], separator: char) -> Result<()> {
    for tag in tags {
        if tag.is_empty() {
            return Err(StorageError::InvalidTag("empty tag".to_string()));
        }
        if tag.contains(separator) {
            return Err(StorageError::InvalidTag(format!(
                "tag {:?} contains separator {:?}",
                tag, separator
            )));
        }
    }
    Ok(())
}

/// Inline column value: `;a;b;`, or `None` for an untagged row.
///
/// Leading and trailing separators anchor every tag so searching for
/// `;a;` cannot match `ab` or `ba`.
pub fn encode_csv(tags: &[String], separator: char) -> Option<String> {
    if tags.is_empty() {
        return None;
    }
    let sep = separator.to_string();
    Some(format!("{sep}{}{sep}", tags.join(&sep)))
}

/// Split an inline column value back into tags.
pub fn decode_csv(column: Option<&str>, separator: char) -> Vec<String> {
    column
        .map(|value| {
            value
                .split(separator)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Substring that occurs in an inline column exactly when it holds `tag`.
///
/// Matched literally, so `%`, `_` and friends need no escaping.
pub fn csv_needle(tag: &str, separator: char) -> String {
    format!("{separator}{tag}{separator}")
}

/// Tag-table rows for a persisted journal row. Duplicate tags collapse.
pub fn tag_rows(ordering: i64, tags: &[String]) -> Vec<TagRow> {
    let mut rows: Vec<TagRow> = Vec::with_capacity(tags.len());
    for tag in tags {
        if rows.iter().any(|r| &r.tag == tag) {
            continue;
        }
        rows.push(TagRow {
            journal_ordering: ordering,
            tag: tag.clone(),
        });
    }
    rows
}
