//! Subscription poll loop.
//!
//! Each subscription is one spawned task running an explicit loop:
//!
//! ```text
//! Idle -> Polling -> Delivering -> (Idle | Polling | Completed)
//! ```
//!
//! The loop owns the query's cursor through its [`PollSource`]. Rows go to
//! the subscriber over a bounded channel; a dropped receiver or a
//! [`ReadJournal::shutdown`](super::ReadJournal::shutdown) ends the loop.
//! Cancellation is checked before every poll and every sleep. A poll already
//! in flight is allowed to finish, and its result is discarded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use super::SubscriptionStream;
use crate::interfaces::{JournalDao, Result};

/// One poll's worth of output.
#[derive(Debug)]
pub struct Poll<T> {
    pub items: Vec<T>,
    /// Storage had nothing more to offer right now; wait a refresh interval
    /// before polling again.
    pub caught_up: bool,
    /// The query is complete and the subscription ends after delivery.
    pub finished: bool,
}

impl<T> Poll<T> {
    pub fn finished(items: Vec<T>) -> Self {
        Self {
            items,
            caught_up: true,
            finished: true,
        }
    }
}

/// A query that can be polled repeatedly, advancing its own cursor.
#[async_trait]
pub trait PollSource: Send + 'static {
    type Item: Send + 'static;

    /// Short description for logs.
    fn label(&self) -> String;

    /// Fetch the next batch past the cursor and advance the cursor over it.
    ///
    /// On error the cursor must be left where it was.
    async fn poll(&mut self, dao: &dyn JournalDao, batch_size: u64) -> Result<Poll<Self::Item>>;
}

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Polling,
    Delivering,
    /// Terminal: a current query exhausted its snapshot.
    Completed,
    /// Terminal: the subscriber went away or the journal shut down.
    Cancelled,
}

/// Loop tuning taken from the read journal configuration.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub refresh_interval: Duration,
    pub batch_size: u64,
    pub channel_capacity: usize,
}

/// Start a poll loop for `source` and return the subscriber's end.
pub fn spawn<S: PollSource>(
    source: S,
    dao: Arc<dyn JournalDao>,
    settings: LoopSettings,
    shutdown: watch::Receiver<bool>,
) -> SubscriptionStream<S::Item> {
    let (tx, rx) = mpsc::channel(settings.channel_capacity.max(1));
    tokio::spawn(run(source, dao, settings, tx, shutdown));
    Box::pin(ReceiverStream::new(rx))
}

async fn run<S: PollSource>(
    mut source: S,
    dao: Arc<dyn JournalDao>,
    settings: LoopSettings,
    tx: mpsc::Sender<Result<S::Item>>,
    mut shutdown: watch::Receiver<bool>,
) -> SubscriptionState {
    let query = source.label();
    info!(query = %query, "Subscription started");

    let mut failing = false;
    let end = loop {
        if is_cancelled(&tx, &shutdown) {
            break SubscriptionState::Cancelled;
        }

        debug!(query = %query, state = ?SubscriptionState::Polling, "Polling");
        let outcome = source.poll(dao.as_ref(), settings.batch_size).await;
        if is_cancelled(&tx, &shutdown) {
            break SubscriptionState::Cancelled;
        }

        match outcome {
            Ok(poll) => {
                if failing {
                    info!(query = %query, "Poll recovered");
                    failing = false;
                }

                let delivered = poll.items.len();
                if delivered > 0 {
                    debug!(query = %query, state = ?SubscriptionState::Delivering, rows = delivered, "Delivering");
                    if !deliver(&tx, &mut shutdown, poll.items).await {
                        break SubscriptionState::Cancelled;
                    }
                }

                if poll.finished {
                    break SubscriptionState::Completed;
                }
                if poll.caught_up {
                    debug!(query = %query, state = ?SubscriptionState::Idle, "Caught up");
                    if !idle(&tx, &mut shutdown, settings.refresh_interval).await {
                        break SubscriptionState::Cancelled;
                    }
                }
            }
            Err(err) => {
                warn!(query = %query, error = %err, "Poll failed; retrying after refresh interval");
                if !failing {
                    failing = true;
                    if !send(&tx, &mut shutdown, Err(err)).await {
                        break SubscriptionState::Cancelled;
                    }
                }
                if !idle(&tx, &mut shutdown, settings.refresh_interval).await {
                    break SubscriptionState::Cancelled;
                }
            }
        }
    };

    info!(query = %query, state = ?end, "Subscription ended");
    end
}

fn is_cancelled<T>(tx: &mpsc::Sender<T>, shutdown: &watch::Receiver<bool>) -> bool {
    tx.is_closed() || *shutdown.borrow()
}

/// Resolves once shutdown has been requested. A dropped sender is not a
/// shutdown request.
async fn shutdown_signalled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Send one item, giving up on cancellation. False when cancelled.
async fn send<T>(
    tx: &mpsc::Sender<Result<T>>,
    shutdown: &mut watch::Receiver<bool>,
    item: Result<T>,
) -> bool {
    tokio::select! {
        sent = tx.send(item) => sent.is_ok(),
        _ = shutdown_signalled(shutdown) => false,
    }
}

async fn deliver<T>(
    tx: &mpsc::Sender<Result<T>>,
    shutdown: &mut watch::Receiver<bool>,
    items: Vec<T>,
) -> bool {
    for item in items {
        if !send(tx, shutdown, Ok(item)).await {
            return false;
        }
    }
    true
}

/// Sleep one refresh interval. False when cancelled meanwhile.
async fn idle<T>(
    tx: &mpsc::Sender<T>,
    shutdown: &mut watch::Receiver<bool>,
    interval: Duration,
) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(interval) => true,
        _ = tx.closed() => false,
        _ = shutdown_signalled(shutdown) => false,
    }
}
