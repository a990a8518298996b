//! Journal query definitions.
//!
//! Every statement the SQL backends run is built here once, dialect-free.
//! Backends render them with their own query builder, either binding values
//! or inlining literals.

use sea_query::{
    Alias, DeleteStatement, Expr, Func, InsertStatement, OnConflict, Order, Query,
    QueryStatementBuilder, SelectStatement, SimpleExpr, UpdateStatement,
};

use super::schema::{
    Journal, JournalMetadata, SqlFunctions, Tags, JOURNAL_INSERT_COLUMNS,
    JOURNAL_SELECT_COLUMNS,
};
use super::tags::{encode_csv, tag_index, TagIndex, TagMode, TagReadMode};
use super::{JournalRow, TagRow};

/// Alias of the journal-side max in the max sequence number query.
pub const JOURNAL_MAX: &str = "journal_max";
/// Alias of the metadata-side max in the max sequence number query.
pub const METADATA_MAX: &str = "metadata_max";
/// Alias of the per-persistence-id max ordering.
pub const MAX_ORDERING: &str = "max_ordering";

/// Statement factory for the journal tables.
pub struct JournalQueries {
    tag_write_mode: TagMode,
    tag_separator: char,
    functions: SqlFunctions,
    tags: Box<dyn TagIndex>,
}

impl JournalQueries {
    pub fn new(
        tag_write_mode: TagMode,
        tag_read_mode: TagReadMode,
        tag_separator: char,
        functions: SqlFunctions,
    ) -> Self {
        Self {
            tag_write_mode,
            tag_separator,
            functions,
            tags: tag_index(tag_read_mode, tag_separator, functions),
        }
    }

    pub fn tag_write_mode(&self) -> TagMode {
        self.tag_write_mode
    }

    pub fn tag_separator(&self) -> char {
        self.tag_separator
    }

    /// Value of the inline tag column for a row, if the write mode uses it.
    pub fn inline_tags(&self, row: &JournalRow) -> Option<String> {
        if self.tag_write_mode.writes_csv() {
            encode_csv(&row.tags, self.tag_separator)
        } else {
            None
        }
    }

    /// Values for one row, in `JOURNAL_INSERT_COLUMNS` order.
    pub fn insert_values(&self, row: &JournalRow) -> [SimpleExpr; 9] {
        [
            row.timestamp.into(),
            row.persistence_id.clone().into(),
            row.sequence_number.into(),
            row.deleted.into(),
            self.inline_tags(row).into(),
            row.message.clone().into(),
            row.identifier.into(),
            row.manifest.clone().into(),
            row.writer_uuid.clone().into(),
        ]
    }

    /// Multi-row insert returning the storage-assigned orderings.
    pub fn insert_rows(&self, rows: &[JournalRow]) -> InsertStatement {
        let mut stmt = Query::insert();
        stmt.into_table(Journal::Table).columns(JOURNAL_INSERT_COLUMNS);
        for row in rows {
            stmt.values_panic(self.insert_values(row));
        }
        stmt.returning(Query::returning().columns([
            Journal::Ordering,
            Journal::PersistenceId,
            Journal::SequenceNumber,
        ]));
        stmt
    }

    pub fn insert_tags(&self, tag_rows: &[TagRow]) -> InsertStatement {
        let mut stmt = Query::insert();
        stmt.into_table(Tags::Table)
            .columns([Tags::OrderingId, Tags::Tag]);
        for tag_row in tag_rows {
            stmt.values_panic([tag_row.journal_ordering.into(), tag_row.tag.clone().into()]);
        }
        stmt
    }

    /// Tags of the given rows, for hydrating reads under the tag-table layout.
    pub fn select_tags(&self, orderings: &[i64]) -> SelectStatement {
        Query::select()
            .columns([Tags::OrderingId, Tags::Tag])
            .from(Tags::Table)
            .and_where(Expr::col(Tags::OrderingId).is_in(orderings.iter().copied()))
            .order_by(Tags::OrderingId, Order::Asc)
            .order_by(Tags::Tag, Order::Asc)
            .to_owned()
    }

    pub fn select_range(
        &self,
        persistence_id: &str,
        from: i64,
        to: i64,
        limit: Option<u64>,
    ) -> SelectStatement {
        let mut stmt = Query::select();
        stmt.columns(JOURNAL_SELECT_COLUMNS)
            .from(Journal::Table)
            .and_where(Expr::col(Journal::PersistenceId).eq(persistence_id))
            .and_where(Expr::col(Journal::SequenceNumber).gte(from))
            .and_where(Expr::col(Journal::SequenceNumber).lte(to))
            .and_where(Expr::col(Journal::Deleted).eq(false))
            .order_by(Journal::SequenceNumber, Order::Asc);
        if let Some(limit) = limit {
            stmt.limit(limit);
        }
        stmt
    }

    /// Max sequence number `>= min`, one row with two nullable columns.
    ///
    /// `JOURNAL_MAX` reads the journal; `METADATA_MAX` reads the metadata
    /// high-water mark and is only populated in compatibility mode.
    pub fn max_sequence_number(
        &self,
        persistence_id: &str,
        min: i64,
        compatibility_mode: bool,
    ) -> SelectStatement {
        let mut stmt = Query::select();
        stmt.expr_as(Expr::col(Journal::SequenceNumber).max(), Alias::new(JOURNAL_MAX))
            .from(Journal::Table)
            .and_where(Expr::col(Journal::PersistenceId).eq(persistence_id))
            .and_where(Expr::col(Journal::SequenceNumber).gte(min));

        if compatibility_mode {
            let metadata = Query::select()
                .expr(Expr::col(JournalMetadata::SequenceNumber).max())
                .from(JournalMetadata::Table)
                .and_where(Expr::col(JournalMetadata::PersistenceId).eq(persistence_id))
                .and_where(Expr::col(JournalMetadata::SequenceNumber).gte(min))
                .to_owned();
            stmt.expr_as(
                SimpleExpr::SubQuery(None, Box::new(metadata.into_sub_query_statement())),
                Alias::new(METADATA_MAX),
            );
        }
        stmt
    }

    pub fn mark_deleted(&self, persistence_id: &str, to_sequence_nr: i64) -> UpdateStatement {
        Query::update()
            .table(Journal::Table)
            .value(Journal::Deleted, true)
            .and_where(Expr::col(Journal::PersistenceId).eq(persistence_id))
            .and_where(Expr::col(Journal::SequenceNumber).lte(to_sequence_nr))
            .to_owned()
    }

    pub fn max_marked_for_deletion(&self, persistence_id: &str) -> SelectStatement {
        Query::select()
            .expr(Expr::col(Journal::SequenceNumber).max())
            .from(Journal::Table)
            .and_where(Expr::col(Journal::PersistenceId).eq(persistence_id))
            .and_where(Expr::col(Journal::Deleted).eq(true))
            .to_owned()
    }

    pub fn metadata_high_water_mark(&self, persistence_id: &str) -> SelectStatement {
        Query::select()
            .column(JournalMetadata::SequenceNumber)
            .from(JournalMetadata::Table)
            .and_where(Expr::col(JournalMetadata::PersistenceId).eq(persistence_id))
            .to_owned()
    }

    /// Insert the metadata row, or raise an existing one to `sequence_nr`.
    ///
    /// The merge happens inside the statement, so the stored mark never
    /// decreases however concurrent writers interleave.
    pub fn upsert_metadata(&self, persistence_id: &str, sequence_nr: i64) -> InsertStatement {
        let merged = Func::cust(Alias::new(self.functions.greatest))
            .arg(Expr::col((JournalMetadata::Table, JournalMetadata::SequenceNumber)))
            .arg(Expr::col((Alias::new("excluded"), JournalMetadata::SequenceNumber)));
        Query::insert()
            .into_table(JournalMetadata::Table)
            .columns([JournalMetadata::PersistenceId, JournalMetadata::SequenceNumber])
            .values_panic([persistence_id.into(), sequence_nr.into()])
            .on_conflict(
                OnConflict::column(JournalMetadata::PersistenceId)
                    .value(JournalMetadata::SequenceNumber, merged)
                    .to_owned(),
            )
            .to_owned()
    }

    /// Tag rows belonging to journal rows about to be purged.
    pub fn purge_tags(&self, persistence_id: &str, to_sequence_nr: i64) -> DeleteStatement {
        let doomed = Query::select()
            .column(Journal::Ordering)
            .from(Journal::Table)
            .and_where(Expr::col(Journal::PersistenceId).eq(persistence_id))
            .and_where(Expr::col(Journal::SequenceNumber).lte(to_sequence_nr))
            .to_owned();
        Query::delete()
            .from_table(Tags::Table)
            .and_where(Expr::col(Tags::OrderingId).in_subquery(doomed))
            .to_owned()
    }

    pub fn purge(&self, persistence_id: &str, to_sequence_nr: i64) -> DeleteStatement {
        Query::delete()
            .from_table(Journal::Table)
            .and_where(Expr::col(Journal::PersistenceId).eq(persistence_id))
            .and_where(Expr::col(Journal::SequenceNumber).lte(to_sequence_nr))
            .to_owned()
    }

    pub fn update_payload(
        &self,
        persistence_id: &str,
        sequence_nr: i64,
        message: Vec<u8>,
    ) -> UpdateStatement {
        Query::update()
            .table(Journal::Table)
            .value(Journal::Message, message)
            .and_where(Expr::col(Journal::PersistenceId).eq(persistence_id))
            .and_where(Expr::col(Journal::SequenceNumber).eq(sequence_nr))
            .to_owned()
    }

    pub fn rows_by_ordering(&self, after: i64, up_to: i64, limit: u64) -> SelectStatement {
        Query::select()
            .columns(JOURNAL_SELECT_COLUMNS)
            .from(Journal::Table)
            .and_where(Expr::col(Journal::Ordering).gt(after))
            .and_where(Expr::col(Journal::Ordering).lte(up_to))
            .and_where(Expr::col(Journal::Deleted).eq(false))
            .order_by(Journal::Ordering, Order::Asc)
            .limit(limit)
            .to_owned()
    }

    pub fn rows_for_tag(&self, tag: &str, after: i64, up_to: i64, limit: u64) -> SelectStatement {
        self.tags.select_for_tag(tag, after, up_to, limit)
    }

    pub fn persistence_ids_after(&self, after: i64, up_to: i64, limit: u64) -> SelectStatement {
        Query::select()
            .column(Journal::PersistenceId)
            .expr_as(Expr::col(Journal::Ordering).max(), Alias::new(MAX_ORDERING))
            .from(Journal::Table)
            .and_where(Expr::col(Journal::Ordering).gt(after))
            .and_where(Expr::col(Journal::Ordering).lte(up_to))
            .group_by_col(Journal::PersistenceId)
            .order_by(Alias::new(MAX_ORDERING), Order::Asc)
            .limit(limit)
            .to_owned()
    }

    pub fn max_ordering(&self) -> SelectStatement {
        Query::select()
            .expr(Expr::col(Journal::Ordering).max())
            .from(Journal::Table)
            .to_owned()
    }

    pub fn orderings_between(&self, after: i64, up_to: i64, limit: u64) -> SelectStatement {
        Query::select()
            .column(Journal::Ordering)
            .from(Journal::Table)
            .and_where(Expr::col(Journal::Ordering).gt(after))
            .and_where(Expr::col(Journal::Ordering).lte(up_to))
            .order_by(Journal::Ordering, Order::Asc)
            .limit(limit)
            .to_owned()
    }
}
