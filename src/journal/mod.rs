//! Journal facade.
//!
//! `SqlJournal` is the request/response surface the host runtime drives:
//! append, range read, max sequence number, prefix deletion and the legacy
//! payload update. It owns the policy around the DAO calls (deadlines,
//! writer stamping, the deletion/high-water-mark sequence) and nothing else.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::JournalConfig;
use crate::interfaces::{JournalDao, Result, StorageError};
use crate::storage::{BulkCopyResult, JournalRow};

/// Run `fut` under an optional deadline.
///
/// An elapsed deadline yields the retryable `StorageError::Timeout`. The
/// operation may or may not have taken effect in storage.
pub async fn with_timeout<T, F>(deadline: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StorageError::Timeout(limit))?,
        None => fut.await,
    }
}

/// Journal facade over a [`JournalDao`].
#[derive(Clone)]
pub struct SqlJournal {
    dao: Arc<dyn JournalDao>,
    config: JournalConfig,
    writer_uuid: Uuid,
}

impl SqlJournal {
    pub fn new(dao: Arc<dyn JournalDao>, config: JournalConfig) -> Self {
        Self {
            dao,
            config,
            writer_uuid: Uuid::new_v4(),
        }
    }

    /// Identity stamped on rows appended without one.
    pub fn writer_uuid(&self) -> Uuid {
        self.writer_uuid
    }

    pub fn dao(&self) -> &Arc<dyn JournalDao> {
        &self.dao
    }

    fn deadline(&self, deadline: Option<Duration>) -> Option<Duration> {
        deadline.or_else(|| self.config.operation_timeout())
    }

    /// Append rows for one or more streams.
    ///
    /// Rows keep their input order. Callers assign contiguous sequence
    /// numbers; the journal never does.
    pub async fn append(
        &self,
        mut rows: Vec<JournalRow>,
        deadline: Option<Duration>,
    ) -> Result<BulkCopyResult> {
        let writer = self.writer_uuid.to_string();
        for row in rows.iter_mut().filter(|r| r.writer_uuid.is_empty()) {
            row.writer_uuid.clone_from(&writer);
        }
        let submitted = rows.len();
        let result = with_timeout(self.deadline(deadline), self.dao.append_batch(rows)).await;
        match &result {
            Ok(copied) => debug!(rows = copied.rows_copied, "Appended rows"),
            Err(StorageError::PartialBatchFailure { copied, .. }) => {
                warn!(copied, submitted, "Append stored only part of the batch")
            }
            Err(_) => {}
        }
        result
    }

    /// Non-deleted rows of one stream with `from <= sequence_number <= to`.
    pub async fn read_range(
        &self,
        persistence_id: &str,
        from: i64,
        to: i64,
        limit: Option<u64>,
        deadline: Option<Duration>,
    ) -> Result<Vec<JournalRow>> {
        with_timeout(
            self.deadline(deadline),
            self.dao.select_range(persistence_id, from, to, limit),
        )
        .await
    }

    /// Highest sequence number at or above `min_sequence_number`, used at
    /// recovery. `None` means the stream has never been written.
    pub async fn max_sequence_number(
        &self,
        persistence_id: &str,
        min_sequence_number: Option<i64>,
        deadline: Option<Duration>,
    ) -> Result<Option<i64>> {
        with_timeout(
            self.deadline(deadline),
            self.dao.max_sequence_number(persistence_id, min_sequence_number),
        )
        .await
    }

    /// Logically delete every row with `sequence_number <= to_sequence_nr`.
    ///
    /// Flags the rows, then raises the metadata high-water mark to the
    /// highest deleted sequence number (never lowering it). With
    /// `logical_delete` off, flagged rows below the mark are purged; the
    /// mark row itself stays so the journal-only max query still sees it.
    /// Returns the rows flagged.
    pub async fn delete_up_to(
        &self,
        persistence_id: &str,
        to_sequence_nr: i64,
        deadline: Option<Duration>,
    ) -> Result<u64> {
        with_timeout(
            self.deadline(deadline),
            self.delete_up_to_inner(persistence_id, to_sequence_nr),
        )
        .await
    }

    async fn delete_up_to_inner(&self, persistence_id: &str, to_sequence_nr: i64) -> Result<u64> {
        let flagged = self.dao.mark_deleted(persistence_id, to_sequence_nr).await?;

        let Some(max_marked) = self.dao.max_marked_for_deletion(persistence_id).await? else {
            debug!(persistence_id = %persistence_id, to_sequence_nr, "Nothing to delete");
            return Ok(flagged);
        };

        // The upsert keeps the larger mark.
        let existing = self.dao.metadata_high_water_mark(persistence_id).await?;
        if existing.map_or(true, |e| e < max_marked) {
            self.dao
                .record_high_water_mark(persistence_id, max_marked)
                .await?;
        }
        let high_water_mark = existing.map_or(max_marked, |e| e.max(max_marked));

        if !self.config.logical_delete {
            let purged = self.dao.purge_up_to(persistence_id, max_marked - 1).await?;
            debug!(persistence_id = %persistence_id, purged, "Purged deleted rows");
        }

        info!(
            persistence_id = %persistence_id,
            to_sequence_nr,
            flagged,
            high_water_mark,
            "Deleted stream prefix"
        );
        Ok(flagged)
    }

    /// Legacy in-place payload rewrite.
    ///
    /// Refused unless `allow_payload_update` is set. `ordering` is left
    /// untouched, so cursors of running subscriptions do not move and rows
    /// already delivered are not redelivered.
    pub async fn update_payload(
        &self,
        persistence_id: &str,
        sequence_nr: i64,
        message: Vec<u8>,
        deadline: Option<Duration>,
    ) -> Result<u64> {
        if !self.config.allow_payload_update {
            return Err(StorageError::Unsupported(
                "in-place payload update is disabled (journal.allow_payload_update)".to_string(),
            ));
        }
        warn!(persistence_id = %persistence_id, sequence_nr, "Rewriting persisted payload");
        with_timeout(
            self.deadline(deadline),
            self.dao.update_payload(persistence_id, sequence_nr, message),
        )
        .await
    }
}
