//! Mock JournalDao implementation for testing.
//!
//! Rows live in memory in ordering order. Besides the plain contract the
//! mock can simulate writes that have been assigned an ordering but are not
//! yet visible to readers (an open transaction on a real database), which is
//! how out-of-order visibility is exercised without a database.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::interfaces::{JournalDao, Result, StorageError};
use crate::storage::tags::validate_tags;
use crate::storage::{BulkCopyResult, JournalRow};

#[derive(Default)]
struct State {
    rows: Vec<JournalRow>,
    metadata: HashMap<String, i64>,
    /// Orderings assigned to rows that readers cannot see yet.
    hidden: BTreeSet<i64>,
    last_ordering: i64,
}

impl State {
    fn visible(&self) -> impl Iterator<Item = &JournalRow> {
        self.rows.iter().filter(|r| !self.hidden.contains(&r.ordering))
    }

    fn insert(&mut self, rows: Vec<JournalRow>) -> Result<Vec<i64>> {
        for row in &rows {
            let duplicate = self.rows.iter().any(|r| {
                r.persistence_id == row.persistence_id && r.sequence_number == row.sequence_number
            });
            if duplicate {
                return Err(StorageError::ConstraintViolation(format!(
                    "duplicate ({}, {})",
                    row.persistence_id, row.sequence_number
                )));
            }
        }
        let mut orderings = Vec::with_capacity(rows.len());
        for mut row in rows {
            self.last_ordering += 1;
            row.ordering = self.last_ordering;
            orderings.push(row.ordering);
            self.rows.push(row);
        }
        Ok(orderings)
    }
}

/// In-memory journal DAO.
pub struct MockJournalDao {
    state: RwLock<State>,
    compatibility_mode: bool,
    tag_separator: char,
    fail_on_append: RwLock<bool>,
    fail_on_read: RwLock<bool>,
    largest_orderings_scan: AtomicUsize,
}

impl Default for MockJournalDao {
    fn default() -> Self {
        Self::new()
    }
}

impl MockJournalDao {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            compatibility_mode: true,
            tag_separator: ';',
            fail_on_append: RwLock::new(false),
            fail_on_read: RwLock::new(false),
            largest_orderings_scan: AtomicUsize::new(0),
        }
    }

    /// Disable the metadata lookup in max sequence number queries.
    pub fn without_compatibility_mode(mut self) -> Self {
        self.compatibility_mode = false;
        self
    }

    pub async fn set_fail_on_append(&self, fail: bool) {
        *self.fail_on_append.write().await = fail;
    }

    /// Every read fails with a retryable connection error while set.
    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    /// Append rows that take an ordering now but stay invisible until
    /// [`reveal`](Self::reveal)ed. Returns the assigned orderings.
    pub async fn append_hidden(&self, rows: Vec<JournalRow>) -> Result<Vec<i64>> {
        let mut state = self.state.write().await;
        let orderings = state.insert(rows)?;
        state.hidden.extend(orderings.iter().copied());
        Ok(orderings)
    }

    /// Make a hidden row visible, as a commit would.
    pub async fn reveal(&self, ordering: i64) {
        self.state.write().await.hidden.remove(&ordering);
    }

    /// Drop a hidden row for good, as a rollback would. Its ordering
    /// becomes a permanent gap.
    pub async fn abandon(&self, ordering: i64) {
        let mut state = self.state.write().await;
        if state.hidden.remove(&ordering) {
            state.rows.retain(|r| r.ordering != ordering);
        }
    }

    /// Most orderings a single `orderings_between` call has returned.
    pub fn largest_orderings_scan(&self) -> usize {
        self.largest_orderings_scan.load(Ordering::Relaxed)
    }

    /// Every stored row, hidden ones included.
    pub async fn all_rows(&self) -> Vec<JournalRow> {
        self.state.read().await.rows.clone()
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::Connection("mock read failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl JournalDao for MockJournalDao {
    async fn append_batch(&self, rows: Vec<JournalRow>) -> Result<BulkCopyResult> {
        if *self.fail_on_append.read().await {
            return Err(StorageError::Connection("mock append failure".to_string()));
        }
        if rows.is_empty() {
            return Ok(BulkCopyResult::default());
        }
        for row in &rows {
            validate_tags(&row.tags, self.tag_separator)?;
        }
        let orderings = self.state.write().await.insert(rows)?;
        Ok(BulkCopyResult {
            rows_copied: orderings.len() as u64,
        })
    }

    async fn select_range(
        &self,
        persistence_id: &str,
        from: i64,
        to: i64,
        limit: Option<u64>,
    ) -> Result<Vec<JournalRow>> {
        self.check_read().await?;
        let state = self.state.read().await;
        let mut rows: Vec<JournalRow> = state
            .visible()
            .filter(|r| {
                r.persistence_id == persistence_id
                    && !r.deleted
                    && r.sequence_number >= from
                    && r.sequence_number <= to
            })
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.sequence_number);
        if let Some(limit) = limit {
            rows.truncate(limit as usize);
        }
        Ok(rows)
    }

    async fn max_sequence_number(
        &self,
        persistence_id: &str,
        min_sequence_number: Option<i64>,
    ) -> Result<Option<i64>> {
        self.check_read().await?;
        let min = min_sequence_number.unwrap_or(0);
        let state = self.state.read().await;
        let journal_max = state
            .visible()
            .filter(|r| r.persistence_id == persistence_id && r.sequence_number >= min)
            .map(|r| r.sequence_number)
            .max();
        let metadata_max = if self.compatibility_mode {
            state
                .metadata
                .get(persistence_id)
                .copied()
                .filter(|seq| *seq >= min)
        } else {
            None
        };
        Ok(journal_max.max(metadata_max))
    }

    async fn mark_deleted(&self, persistence_id: &str, to_sequence_nr: i64) -> Result<u64> {
        let mut state = self.state.write().await;
        let mut affected = 0;
        for row in state.rows.iter_mut() {
            if row.persistence_id == persistence_id && row.sequence_number <= to_sequence_nr {
                row.deleted = true;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn max_marked_for_deletion(&self, persistence_id: &str) -> Result<Option<i64>> {
        self.check_read().await?;
        let state = self.state.read().await;
        Ok(state
            .visible()
            .filter(|r| r.persistence_id == persistence_id && r.deleted)
            .map(|r| r.sequence_number)
            .max())
    }

    async fn metadata_high_water_mark(&self, persistence_id: &str) -> Result<Option<i64>> {
        self.check_read().await?;
        Ok(self.state.read().await.metadata.get(persistence_id).copied())
    }

    async fn record_high_water_mark(&self, persistence_id: &str, sequence_nr: i64) -> Result<()> {
        let mut state = self.state.write().await;
        let mark = state
            .metadata
            .entry(persistence_id.to_string())
            .or_insert(sequence_nr);
        *mark = (*mark).max(sequence_nr);
        Ok(())
    }

    async fn purge_up_to(&self, persistence_id: &str, to_sequence_nr: i64) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.rows.len();
        state.rows.retain(|r| {
            !(r.persistence_id == persistence_id && r.sequence_number <= to_sequence_nr)
        });
        Ok((before - state.rows.len()) as u64)
    }

    async fn update_payload(
        &self,
        persistence_id: &str,
        sequence_nr: i64,
        message: Vec<u8>,
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        match state
            .rows
            .iter_mut()
            .find(|r| r.persistence_id == persistence_id && r.sequence_number == sequence_nr)
        {
            Some(row) => {
                row.message = message;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn rows_by_ordering(&self, after: i64, up_to: i64, limit: u64) -> Result<Vec<JournalRow>> {
        self.check_read().await?;
        let state = self.state.read().await;
        Ok(state
            .visible()
            .filter(|r| !r.deleted && r.ordering > after && r.ordering <= up_to)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn rows_for_tag(
        &self,
        tag: &str,
        after: i64,
        up_to: i64,
        limit: u64,
    ) -> Result<Vec<JournalRow>> {
        self.check_read().await?;
        let state = self.state.read().await;
        Ok(state
            .visible()
            .filter(|r| {
                !r.deleted
                    && r.ordering > after
                    && r.ordering <= up_to
                    && r.tags.iter().any(|t| t == tag)
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn persistence_ids_after(
        &self,
        after: i64,
        up_to: i64,
        limit: u64,
    ) -> Result<Vec<(String, i64)>> {
        self.check_read().await?;
        let state = self.state.read().await;
        let mut max_by_id: HashMap<&str, i64> = HashMap::new();
        for row in state
            .visible()
            .filter(|r| r.ordering > after && r.ordering <= up_to)
        {
            let entry = max_by_id.entry(row.persistence_id.as_str()).or_insert(row.ordering);
            *entry = (*entry).max(row.ordering);
        }
        let mut ids: Vec<(String, i64)> = max_by_id
            .into_iter()
            .map(|(id, ordering)| (id.to_string(), ordering))
            .collect();
        ids.sort_by_key(|(_, ordering)| *ordering);
        ids.truncate(limit as usize);
        Ok(ids)
    }

    async fn max_ordering(&self) -> Result<Option<i64>> {
        self.check_read().await?;
        Ok(self.state.read().await.visible().map(|r| r.ordering).max())
    }

    async fn orderings_between(&self, after: i64, up_to: i64, limit: u64) -> Result<Vec<i64>> {
        self.check_read().await?;
        let state = self.state.read().await;
        let mut orderings: Vec<i64> = state
            .visible()
            .map(|r| r.ordering)
            .filter(|o| *o > after && *o <= up_to)
            .collect();
        orderings.sort_unstable();
        orderings.truncate(limit as usize);
        self.largest_orderings_scan
            .fetch_max(orderings.len(), Ordering::Relaxed);
        Ok(orderings)
    }
}
