//! Live query engine.
//!
//! `ReadJournal` turns the DAO's range primitives into continuously
//! refreshing subscriptions. Every query comes in two modes:
//!
//! - live (`events_by_tag`, `all_events`, ...): never completes; after
//!   catching up it sleeps for the refresh interval and polls again.
//! - current (`current_events_by_tag`, ...): captures the journal's upper
//!   bound on the first poll, delivers everything up to it and completes.
//!
//! Delivery is at-least-once and in cursor order. A subscription is
//! restartable by subscribing again from the last offset it delivered.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::watch;
use tracing::info;

use crate::config::ReadJournalConfig;
use crate::interfaces::{JournalDao, Result};
use crate::storage::JournalRow;

pub mod gaps;
pub mod sources;
pub mod subscription;

use sources::{OrderedEvents, PersistenceIds, RowFilter, StreamEvents};
use subscription::{LoopSettings, PollSource};

/// Subscriber end of a query.
pub type SubscriptionStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Polling read side of the journal.
pub struct ReadJournal {
    dao: Arc<dyn JournalDao>,
    config: ReadJournalConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl ReadJournal {
    pub fn new(dao: Arc<dyn JournalDao>, config: ReadJournalConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            dao,
            config,
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &ReadJournalConfig {
        &self.config
    }

    /// Cancel every subscription started from this journal. Subscriptions
    /// started afterwards end immediately. Dropping the `ReadJournal` alone
    /// does not cancel running subscriptions.
    pub fn shutdown(&self) {
        info!("Shutting down read journal subscriptions");
        self.shutdown_tx.send_replace(true);
    }

    fn subscribe<S: PollSource>(&self, source: S) -> SubscriptionStream<S::Item> {
        let settings = LoopSettings {
            refresh_interval: self.config.refresh_interval(),
            batch_size: self.config.batch_size,
            channel_capacity: self.config.channel_capacity,
        };
        subscription::spawn(
            source,
            Arc::clone(&self.dao),
            settings,
            self.shutdown_tx.subscribe(),
        )
    }

    /// Events of one stream with `from <= sequence_number <= to`, following
    /// new writes. Completes once `to_sequence_nr` has been delivered, so
    /// pass `i64::MAX` to follow the stream indefinitely.
    pub fn events_by_persistence_id(
        &self,
        persistence_id: &str,
        from_sequence_nr: i64,
        to_sequence_nr: i64,
    ) -> SubscriptionStream<JournalRow> {
        self.subscribe(StreamEvents::new(
            persistence_id,
            from_sequence_nr,
            to_sequence_nr,
            true,
        ))
    }

    /// Events of one stream up to its highest sequence number at start.
    pub fn current_events_by_persistence_id(
        &self,
        persistence_id: &str,
        from_sequence_nr: i64,
        to_sequence_nr: i64,
    ) -> SubscriptionStream<JournalRow> {
        self.subscribe(StreamEvents::new(
            persistence_id,
            from_sequence_nr,
            to_sequence_nr,
            false,
        ))
    }

    /// Events carrying `tag` with `ordering > offset`, following new writes.
    pub fn events_by_tag(&self, tag: &str, offset: i64) -> SubscriptionStream<JournalRow> {
        self.subscribe(OrderedEvents::new(
            RowFilter::Tag(tag.to_string()),
            offset,
            true,
            self.config.ordering_gap_max_polls,
        ))
    }

    /// Events carrying `tag` with `offset < ordering <= max ordering at start`.
    pub fn current_events_by_tag(&self, tag: &str, offset: i64) -> SubscriptionStream<JournalRow> {
        self.subscribe(OrderedEvents::new(
            RowFilter::Tag(tag.to_string()),
            offset,
            false,
            0,
        ))
    }

    /// Every event with `ordering > offset`, following new writes.
    pub fn all_events(&self, offset: i64) -> SubscriptionStream<JournalRow> {
        self.subscribe(OrderedEvents::new(
            RowFilter::All,
            offset,
            true,
            self.config.ordering_gap_max_polls,
        ))
    }

    /// Every event with `offset < ordering <= max ordering at start`.
    pub fn current_all_events(&self, offset: i64) -> SubscriptionStream<JournalRow> {
        self.subscribe(OrderedEvents::new(RowFilter::All, offset, false, 0))
    }

    /// Each persistence id once, as streams appear.
    pub fn persistence_ids(&self) -> SubscriptionStream<String> {
        self.subscribe(PersistenceIds::new(true))
    }

    /// Each persistence id written before the query started, once.
    pub fn current_persistence_ids(&self) -> SubscriptionStream<String> {
        self.subscribe(PersistenceIds::new(false))
    }
}

#[cfg(test)]
mod tests;
