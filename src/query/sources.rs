//! Poll sources, one per query shape.
//!
//! Each source holds a single cursor and, for current (terminating) queries,
//! the snapshot bound captured on the first poll:
//!
//! - [`StreamEvents`]: one persistence id, cursor = last delivered sequence
//!   number.
//! - [`OrderedEvents`]: all events or one tag, cursor = last delivered
//!   ordering, with gap tracking in live mode.
//! - [`PersistenceIds`]: distinct persistence ids, cursor = seen-set plus an
//!   ordering watermark.

use std::collections::HashSet;

use async_trait::async_trait;

use super::gaps::GapTracker;
use super::subscription::{Poll, PollSource};
use crate::interfaces::{JournalDao, Result};
use crate::storage::JournalRow;

/// Orderings scanned per contiguity check, in multiples of the poll batch
/// size.
const GAP_CHECK_BATCHES: u64 = 64;

/// Events of one persistence id, ascending by sequence number.
pub struct StreamEvents {
    persistence_id: String,
    /// Last delivered sequence number.
    cursor: i64,
    to_sequence_nr: i64,
    live: bool,
    bound: Option<i64>,
}

impl StreamEvents {
    pub fn new(persistence_id: impl Into<String>, from_sequence_nr: i64, to_sequence_nr: i64, live: bool) -> Self {
        Self {
            persistence_id: persistence_id.into(),
            cursor: from_sequence_nr.saturating_sub(1),
            to_sequence_nr,
            live,
            bound: None,
        }
    }

    async fn bound(&mut self, dao: &dyn JournalDao) -> Result<i64> {
        if let Some(bound) = self.bound {
            return Ok(bound);
        }
        let bound = if self.live {
            self.to_sequence_nr
        } else {
            dao.max_sequence_number(&self.persistence_id, None)
                .await?
                .unwrap_or(self.cursor)
                .min(self.to_sequence_nr)
        };
        self.bound = Some(bound);
        Ok(bound)
    }
}

#[async_trait]
impl PollSource for StreamEvents {
    type Item = JournalRow;

    fn label(&self) -> String {
        let mode = if self.live { "live" } else { "current" };
        format!("events_by_persistence_id({}, {mode})", self.persistence_id)
    }

    async fn poll(&mut self, dao: &dyn JournalDao, batch_size: u64) -> Result<Poll<JournalRow>> {
        let bound = self.bound(dao).await?;
        if self.cursor >= bound {
            return Ok(Poll::finished(Vec::new()));
        }

        let rows = dao
            .select_range(&self.persistence_id, self.cursor + 1, bound, Some(batch_size))
            .await?;
        let fetched = rows.len() as u64;
        if let Some(last) = rows.last() {
            self.cursor = last.sequence_number;
        }

        let exhausted = fetched < batch_size;
        Ok(Poll {
            items: rows,
            caught_up: exhausted,
            finished: self.cursor >= self.to_sequence_nr
                || (!self.live && (exhausted || self.cursor >= bound)),
        })
    }
}

/// Row filter of an [`OrderedEvents`] query.
#[derive(Debug, Clone)]
pub enum RowFilter {
    All,
    Tag(String),
}

/// All events or one tag's events, ascending by ordering.
pub struct OrderedEvents {
    filter: RowFilter,
    /// Last delivered ordering.
    cursor: i64,
    live: bool,
    gap_max_polls: u32,
    bound: Option<i64>,
    gaps: GapTracker,
}

impl OrderedEvents {
    pub fn new(filter: RowFilter, offset: i64, live: bool, gap_max_polls: u32) -> Self {
        Self {
            filter,
            cursor: offset,
            live,
            gap_max_polls,
            bound: None,
            gaps: GapTracker::disabled(),
        }
    }

    /// Capture the snapshot bound (current) or the gap baseline (live).
    async fn bound(&mut self, dao: &dyn JournalDao) -> Result<i64> {
        if let Some(bound) = self.bound {
            return Ok(bound);
        }
        let max_ordering = dao.max_ordering().await?.unwrap_or(0);
        let bound = if self.live {
            self.gaps = GapTracker::new(self.gap_max_polls, max_ordering.max(self.cursor));
            i64::MAX
        } else {
            max_ordering
        };
        self.bound = Some(bound);
        Ok(bound)
    }

    async fn fetch(&self, dao: &dyn JournalDao, up_to: i64, limit: u64) -> Result<Vec<JournalRow>> {
        match &self.filter {
            RowFilter::All => dao.rows_by_ordering(self.cursor, up_to, limit).await,
            RowFilter::Tag(tag) => dao.rows_for_tag(tag, self.cursor, up_to, limit).await,
        }
    }
}

#[async_trait]
impl PollSource for OrderedEvents {
    type Item = JournalRow;

    fn label(&self) -> String {
        let mode = if self.live { "live" } else { "current" };
        match &self.filter {
            RowFilter::All => format!("all_events({mode})"),
            RowFilter::Tag(tag) => format!("events_by_tag({tag}, {mode})"),
        }
    }

    async fn poll(&mut self, dao: &dyn JournalDao, batch_size: u64) -> Result<Poll<JournalRow>> {
        let bound = self.bound(dao).await?;
        if self.cursor >= bound {
            return Ok(Poll::finished(Vec::new()));
        }

        let mut rows = self.fetch(dao, bound, batch_size).await?;
        let fetched = rows.len() as u64;
        let mut held = false;
        // the check window ended before the last fetched row
        let mut truncated = false;

        if let Some(last) = rows.last().map(|r| r.ordering) {
            let mut next_cursor = last;
            if self.gaps.needs_check(last) {
                let from = self.cursor.max(self.gaps.settled_through());
                let window = batch_size.saturating_mul(GAP_CHECK_BATCHES);
                let present = dao.orderings_between(from, last, window).await?;
                let checked_through = match present.last() {
                    Some(&end) if present.len() as u64 >= window => end,
                    _ => last,
                };
                let through = self.gaps.deliverable_through(from, &present);
                if through < last {
                    rows.retain(|r| r.ordering <= through);
                }
                held = through < checked_through;
                truncated = !held && through < last;
                next_cursor = through;
            }
            self.cursor = self.cursor.max(next_cursor);
        }

        let exhausted = fetched < batch_size && !truncated;
        Ok(Poll {
            items: rows,
            caught_up: exhausted || held,
            finished: !self.live && (exhausted || self.cursor >= bound),
        })
    }
}

/// Distinct persistence ids in order of their latest write.
pub struct PersistenceIds {
    seen: HashSet<String>,
    /// Highest ordering covered by a completed poll.
    watermark: i64,
    live: bool,
    bound: Option<i64>,
}

impl PersistenceIds {
    pub fn new(live: bool) -> Self {
        Self {
            seen: HashSet::new(),
            watermark: 0,
            live,
            bound: None,
        }
    }

    async fn bound(&mut self, dao: &dyn JournalDao) -> Result<i64> {
        if let Some(bound) = self.bound {
            return Ok(bound);
        }
        let bound = if self.live {
            i64::MAX
        } else {
            dao.max_ordering().await?.unwrap_or(0)
        };
        self.bound = Some(bound);
        Ok(bound)
    }
}

#[async_trait]
impl PollSource for PersistenceIds {
    type Item = String;

    fn label(&self) -> String {
        let mode = if self.live { "live" } else { "current" };
        format!("persistence_ids({mode})")
    }

    async fn poll(&mut self, dao: &dyn JournalDao, batch_size: u64) -> Result<Poll<String>> {
        let bound = self.bound(dao).await?;
        if self.watermark >= bound {
            return Ok(Poll::finished(Vec::new()));
        }

        let ids = dao
            .persistence_ids_after(self.watermark, bound, batch_size)
            .await?;
        let fetched = ids.len() as u64;
        let mut fresh = Vec::new();
        for (persistence_id, max_ordering) in ids {
            self.watermark = self.watermark.max(max_ordering);
            if self.seen.insert(persistence_id.clone()) {
                fresh.push(persistence_id);
            }
        }

        let exhausted = fetched < batch_size;
        Ok(Poll {
            items: fresh,
            caught_up: exhausted,
            finished: !self.live && (exhausted || self.watermark >= bound),
        })
    }
}
