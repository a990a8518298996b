//! Unified SQL JournalDao implementation.
//!
//! Uses a macro to generate implementations for each SQL backend,
//! eliminating code duplication while maintaining type safety.

use std::marker::PhantomData;

use super::SqlDatabase;
use crate::config::JournalConfig;
use crate::storage::bulk::{rows_per_statement, BulkCopyMode};
use crate::storage::queries::JournalQueries;
use crate::storage::schema::JOURNAL_INSERT_COLUMNS;
use crate::storage::tags::TagReadMode;

/// Tag rows are two columns wide.
const TAG_COLUMNS: usize = 2;

/// Orderings per `IN (...)` list when hydrating tags.
const HYDRATE_CHUNK: usize = 1000;

/// Key of a freshly inserted row, as reported by `RETURNING`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedKey {
    pub ordering: i64,
    pub persistence_id: String,
    pub sequence_number: i64,
}

/// SQL-based implementation of JournalDao.
///
/// This generic implementation works with any SQL database that implements
/// the `SqlDatabase` trait (PostgreSQL, SQLite).
pub struct SqlJournalDao<DB: SqlDatabase> {
    pool: DB::Pool,
    config: JournalConfig,
    queries: JournalQueries,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlJournalDao<DB> {
    /// Create a new SQL journal DAO with the given pool.
    pub fn new(pool: DB::Pool, config: JournalConfig, tag_read_mode: TagReadMode) -> Self {
        let queries = JournalQueries::new(
            config.tag_write_mode,
            tag_read_mode,
            config.tag_separator,
            DB::FUNCTIONS,
        );
        Self {
            pool,
            config,
            queries,
            _marker: PhantomData,
        }
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &DB::Pool {
        &self.pool
    }

    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    pub(crate) fn queries(&self) -> &JournalQueries {
        &self.queries
    }

    /// Whether inserts bind values rather than inlining literals.
    pub(crate) fn uses_parameters(&self) -> bool {
        self.config.dao.prefer_parameters_on_multi_row_insert
    }

    fn journal_rows_per_statement(&self) -> usize {
        rows_per_statement(
            self.config.dao.db_round_trip_batch_size,
            self.uses_parameters(),
            DB::MAX_BIND_PARAMETERS,
            JOURNAL_INSERT_COLUMNS.len(),
        )
    }

    fn tag_rows_per_statement(&self) -> usize {
        rows_per_statement(
            self.config.dao.db_round_trip_batch_size,
            self.uses_parameters(),
            DB::MAX_BIND_PARAMETERS,
            TAG_COLUMNS,
        )
    }

    /// Rows hold their tags only in the tag table and need a second read.
    fn needs_tag_hydration(&self) -> bool {
        !self.config.tag_write_mode.writes_csv()
    }
}

/// Render a statement and run it, binding values when `$bind` is true.
macro_rules! run {
    ($db_type:ty, $stmt:expr, $bind:expr, $method:ident, $executor:expr) => {{
        let stmt = $stmt;
        if $bind {
            let (sql, values) = <$db_type as $crate::storage::sql::SqlDatabase>::bind(&stmt);
            sqlx::query_with(&sql, values).$method($executor).await
        } else {
            let sql = <$db_type as $crate::storage::sql::SqlDatabase>::render(&stmt);
            sqlx::query(&sql).$method($executor).await
        }
    }};
}

pub(crate) use run;

/// Macro to implement JournalDao for a specific SQL backend.
///
/// The backend must provide an inherent `native_insert` on its DAO type for
/// `BulkCopyMode::Default`.
macro_rules! impl_journal_dao {
    ($db_type:ty, $row_type:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        impl SqlJournalDao<$db_type> {
            /// Create the journal, metadata and tag tables if missing.
            pub async fn init(&self) -> crate::interfaces::Result<()> {
                sqlx::raw_sql(<$db_type as SqlDatabase>::CREATE_TABLES)
                    .execute(&self.pool)
                    .await?;
                tracing::info!(backend = <$db_type as SqlDatabase>::NAME, "Journal schema initialized");
                Ok(())
            }

            pub(crate) fn inserted_key(row: &$row_type) -> crate::interfaces::Result<InsertedKey> {
                use sqlx::Row;

                Ok(InsertedKey {
                    ordering: row.try_get("ordering")?,
                    persistence_id: row.try_get("persistence_id")?,
                    sequence_number: row.try_get("sequence_number")?,
                })
            }

            fn decode_row(&self, row: &$row_type) -> crate::interfaces::Result<crate::storage::JournalRow> {
                use sqlx::Row;

                let inline_tags: Option<String> = row.try_get("tags")?;
                Ok(crate::storage::JournalRow {
                    ordering: row.try_get("ordering")?,
                    persistence_id: row.try_get("persistence_id")?,
                    sequence_number: row.try_get("sequence_number")?,
                    deleted: row.try_get("deleted")?,
                    timestamp: row.try_get("created")?,
                    message: row.try_get("message")?,
                    manifest: row.try_get("manifest")?,
                    identifier: row.try_get("identifier")?,
                    writer_uuid: row.try_get("writer_uuid")?,
                    tags: crate::storage::tags::decode_csv(
                        inline_tags.as_deref(),
                        self.config.tag_separator,
                    ),
                })
            }

            async fn fetch_journal_rows(
                &self,
                stmt: sea_query::SelectStatement,
            ) -> crate::interfaces::Result<Vec<crate::storage::JournalRow>> {
                let records = run!($db_type, stmt, true, fetch_all, &self.pool)?;
                let mut rows = records
                    .iter()
                    .map(|record| self.decode_row(record))
                    .collect::<crate::interfaces::Result<Vec<_>>>()?;
                if self.needs_tag_hydration() && !rows.is_empty() {
                    self.hydrate_tags(&mut rows).await?;
                }
                Ok(rows)
            }

            /// Fill `tags` from the tag table.
            async fn hydrate_tags(
                &self,
                rows: &mut [crate::storage::JournalRow],
            ) -> crate::interfaces::Result<()> {
                use std::collections::HashMap;
                use sqlx::Row;

                let orderings: Vec<i64> = rows.iter().map(|r| r.ordering).collect();
                let mut by_ordering: HashMap<i64, Vec<String>> = HashMap::new();
                for chunk in orderings.chunks(HYDRATE_CHUNK) {
                    let records =
                        run!($db_type, self.queries.select_tags(chunk), true, fetch_all, &self.pool)?;
                    for record in &records {
                        let ordering: i64 = record.try_get("ordering_id")?;
                        let tag: String = record.try_get("tag")?;
                        by_ordering.entry(ordering).or_default().push(tag);
                    }
                }
                for row in rows.iter_mut() {
                    if let Some(tags) = by_ordering.remove(&row.ordering) {
                        row.tags = tags;
                    }
                }
                Ok(())
            }

            /// Insert one chunk and its tag rows in a single transaction.
            async fn insert_chunk(
                &self,
                chunk: &[crate::storage::JournalRow],
            ) -> crate::interfaces::Result<u64> {
                use std::collections::HashMap;

                use crate::interfaces::StorageError;
                use crate::storage::tags::tag_rows;

                let mut tx = self.pool.begin().await?;

                let inserted = match self.config.dao.bulk_copy_mode {
                    BulkCopyMode::MultipleRows => {
                        let records = run!(
                            $db_type,
                            self.queries.insert_rows(chunk),
                            self.uses_parameters(),
                            fetch_all,
                            &mut *tx
                        )?;
                        records
                            .iter()
                            .map(Self::inserted_key)
                            .collect::<crate::interfaces::Result<Vec<_>>>()?
                    }
                    BulkCopyMode::Default => self.native_insert(&mut *tx, chunk).await?,
                };

                if inserted.len() != chunk.len() {
                    // Dropping the transaction rolls the chunk back.
                    return Err(StorageError::PartialBatchFailure {
                        copied: 0,
                        submitted: chunk.len() as u64,
                        reason: format!(
                            "storage reported {} of {} rows inserted",
                            inserted.len(),
                            chunk.len()
                        ),
                    });
                }

                if self.config.tag_write_mode.writes_tag_table() {
                    let orderings: HashMap<(&str, i64), i64> = inserted
                        .iter()
                        .map(|k| ((k.persistence_id.as_str(), k.sequence_number), k.ordering))
                        .collect();
                    let mut pending = Vec::new();
                    for row in chunk.iter().filter(|r| !r.tags.is_empty()) {
                        if let Some(ordering) =
                            orderings.get(&(row.persistence_id.as_str(), row.sequence_number))
                        {
                            pending.extend(tag_rows(*ordering, &row.tags));
                        }
                    }
                    for tag_chunk in pending.chunks(self.tag_rows_per_statement()) {
                        run!(
                            $db_type,
                            self.queries.insert_tags(tag_chunk),
                            self.uses_parameters(),
                            execute,
                            &mut *tx
                        )?;
                    }
                }

                tx.commit().await?;
                Ok(inserted.len() as u64)
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::interfaces::JournalDao for SqlJournalDao<$db_type> {
            async fn append_batch(
                &self,
                rows: Vec<crate::storage::JournalRow>,
            ) -> crate::interfaces::Result<crate::storage::BulkCopyResult> {
                use crate::interfaces::StorageError;

                if rows.is_empty() {
                    return Ok(crate::storage::BulkCopyResult::default());
                }
                for row in &rows {
                    crate::storage::tags::validate_tags(&row.tags, self.config.tag_separator)?;
                }

                let submitted = rows.len() as u64;
                let mut copied = 0u64;
                for chunk in rows.chunks(self.journal_rows_per_statement()) {
                    match self.insert_chunk(chunk).await {
                        Ok(n) => copied += n,
                        Err(StorageError::PartialBatchFailure { reason, .. }) => {
                            return Err(StorageError::PartialBatchFailure {
                                copied,
                                submitted,
                                reason,
                            });
                        }
                        Err(err) if copied == 0 => return Err(err),
                        Err(err) => {
                            tracing::warn!(copied, submitted, error = %err, "Bulk insert failed mid-batch");
                            return Err(StorageError::PartialBatchFailure {
                                copied,
                                submitted,
                                reason: err.to_string(),
                            });
                        }
                    }
                }

                tracing::debug!(rows = copied, backend = <$db_type as SqlDatabase>::NAME, "Appended batch");
                Ok(crate::storage::BulkCopyResult { rows_copied: copied })
            }

            async fn select_range(
                &self,
                persistence_id: &str,
                from: i64,
                to: i64,
                limit: Option<u64>,
            ) -> crate::interfaces::Result<Vec<crate::storage::JournalRow>> {
                if from > to || limit == Some(0) {
                    return Ok(Vec::new());
                }
                self.fetch_journal_rows(self.queries.select_range(persistence_id, from, to, limit))
                    .await
            }

            async fn max_sequence_number(
                &self,
                persistence_id: &str,
                min_sequence_number: Option<i64>,
            ) -> crate::interfaces::Result<Option<i64>> {
                use sqlx::Row;

                use crate::storage::queries::{JOURNAL_MAX, METADATA_MAX};

                let compatibility = self.config.sequence_number_compatibility_mode;
                let stmt = self.queries.max_sequence_number(
                    persistence_id,
                    min_sequence_number.unwrap_or(0),
                    compatibility,
                );
                let record = run!($db_type, stmt, true, fetch_one, &self.pool)?;

                let journal_max: Option<i64> = record.try_get(JOURNAL_MAX)?;
                let metadata_max: Option<i64> = if compatibility {
                    record.try_get(METADATA_MAX)?
                } else {
                    None
                };
                Ok(journal_max.max(metadata_max))
            }

            async fn mark_deleted(
                &self,
                persistence_id: &str,
                to_sequence_nr: i64,
            ) -> crate::interfaces::Result<u64> {
                let result = run!(
                    $db_type,
                    self.queries.mark_deleted(persistence_id, to_sequence_nr),
                    true,
                    execute,
                    &self.pool
                )?;
                Ok(result.rows_affected())
            }

            async fn max_marked_for_deletion(
                &self,
                persistence_id: &str,
            ) -> crate::interfaces::Result<Option<i64>> {
                use sqlx::Row;

                let record = run!(
                    $db_type,
                    self.queries.max_marked_for_deletion(persistence_id),
                    true,
                    fetch_one,
                    &self.pool
                )?;
                Ok(record.try_get(0)?)
            }

            async fn metadata_high_water_mark(
                &self,
                persistence_id: &str,
            ) -> crate::interfaces::Result<Option<i64>> {
                use sqlx::Row;

                let record = run!(
                    $db_type,
                    self.queries.metadata_high_water_mark(persistence_id),
                    true,
                    fetch_optional,
                    &self.pool
                )?;
                match record {
                    Some(record) => Ok(Some(record.try_get("sequence_number")?)),
                    None => Ok(None),
                }
            }

            async fn record_high_water_mark(
                &self,
                persistence_id: &str,
                sequence_nr: i64,
            ) -> crate::interfaces::Result<()> {
                run!(
                    $db_type,
                    self.queries.upsert_metadata(persistence_id, sequence_nr),
                    true,
                    execute,
                    &self.pool
                )?;
                Ok(())
            }

            async fn purge_up_to(
                &self,
                persistence_id: &str,
                to_sequence_nr: i64,
            ) -> crate::interfaces::Result<u64> {
                let mut tx = self.pool.begin().await?;
                run!(
                    $db_type,
                    self.queries.purge_tags(persistence_id, to_sequence_nr),
                    true,
                    execute,
                    &mut *tx
                )?;
                let result = run!(
                    $db_type,
                    self.queries.purge(persistence_id, to_sequence_nr),
                    true,
                    execute,
                    &mut *tx
                )?;
                tx.commit().await?;
                tracing::debug!(
                    persistence_id = %persistence_id,
                    to_sequence_nr,
                    rows = result.rows_affected(),
                    "Purged deleted rows"
                );
                Ok(result.rows_affected())
            }

            async fn update_payload(
                &self,
                persistence_id: &str,
                sequence_nr: i64,
                message: Vec<u8>,
            ) -> crate::interfaces::Result<u64> {
                let result = run!(
                    $db_type,
                    self.queries.update_payload(persistence_id, sequence_nr, message),
                    true,
                    execute,
                    &self.pool
                )?;
                Ok(result.rows_affected())
            }

            async fn rows_by_ordering(
                &self,
                after: i64,
                up_to: i64,
                limit: u64,
            ) -> crate::interfaces::Result<Vec<crate::storage::JournalRow>> {
                if after >= up_to || limit == 0 {
                    return Ok(Vec::new());
                }
                self.fetch_journal_rows(self.queries.rows_by_ordering(after, up_to, limit))
                    .await
            }

            async fn rows_for_tag(
                &self,
                tag: &str,
                after: i64,
                up_to: i64,
                limit: u64,
            ) -> crate::interfaces::Result<Vec<crate::storage::JournalRow>> {
                if after >= up_to || limit == 0 {
                    return Ok(Vec::new());
                }
                self.fetch_journal_rows(self.queries.rows_for_tag(tag, after, up_to, limit))
                    .await
            }

            async fn persistence_ids_after(
                &self,
                after: i64,
                up_to: i64,
                limit: u64,
            ) -> crate::interfaces::Result<Vec<(String, i64)>> {
                use sqlx::Row;

                use crate::storage::queries::MAX_ORDERING;

                if after >= up_to || limit == 0 {
                    return Ok(Vec::new());
                }
                let records = run!(
                    $db_type,
                    self.queries.persistence_ids_after(after, up_to, limit),
                    true,
                    fetch_all,
                    &self.pool
                )?;
                records
                    .iter()
                    .map(|record| -> crate::interfaces::Result<(String, i64)> {
                        let persistence_id: String = record.try_get("persistence_id")?;
                        let max_ordering: i64 = record.try_get(MAX_ORDERING)?;
                        Ok((persistence_id, max_ordering))
                    })
                    .collect()
            }

            async fn max_ordering(&self) -> crate::interfaces::Result<Option<i64>> {
                use sqlx::Row;

                let record = run!($db_type, self.queries.max_ordering(), true, fetch_one, &self.pool)?;
                Ok(record.try_get(0)?)
            }

            async fn orderings_between(
                &self,
                after: i64,
                up_to: i64,
                limit: u64,
            ) -> crate::interfaces::Result<Vec<i64>> {
                use sqlx::Row;

                if after >= up_to || limit == 0 {
                    return Ok(Vec::new());
                }
                let records = run!(
                    $db_type,
                    self.queries.orderings_between(after, up_to, limit),
                    true,
                    fetch_all,
                    &self.pool
                )?;
                records
                    .iter()
                    .map(|record| -> crate::interfaces::Result<i64> { Ok(record.try_get("ordering")?) })
                    .collect()
            }
        }
    };
}

// Generate implementations for each SQL backend
impl_journal_dao!(super::postgres::Postgres, sqlx::postgres::PgRow, "postgres");
impl_journal_dao!(super::sqlite::Sqlite, sqlx::sqlite::SqliteRow, "sqlite");
