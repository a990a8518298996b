//! sqljournal-tail: follow a journal from the command line
//!
//! Opens the configured journal and logs every row a live query delivers,
//! until interrupted.
//!
//! ## Configuration
//! - `--config <path>` / SQLJOURNAL_CONFIG: journal configuration file
//! - SQLJOURNAL__*: configuration overrides (e.g. SQLJOURNAL__STORAGE__URI)
//! - SQLJOURNAL_LOG: log filter (default "info")
//! - TAIL_TAG: follow one tag instead of all events
//! - TAIL_PERSISTENCE_ID: follow one stream instead of all events
//! - TAIL_OFFSET: ordering (or sequence number) to start after (default 0)
//! - TAIL_CURRENT: if set, stop at the journal's end instead of following

use futures::StreamExt;
use tracing::{error, info, warn};

use sqljournal::config::Config;
use sqljournal::query::SubscriptionStream;
use sqljournal::storage::init_storage;
use sqljournal::utils::bootstrap::{self, RetryPolicy};
use sqljournal::{JournalRow, ReadJournal};

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok()
}

fn open_stream(journal: &ReadJournal, offset: i64, current: bool) -> SubscriptionStream<JournalRow> {
    if let Ok(persistence_id) = std::env::var("TAIL_PERSISTENCE_ID") {
        info!(persistence_id = %persistence_id, "Tailing stream");
        let from = offset.saturating_add(1);
        return if current {
            journal.current_events_by_persistence_id(&persistence_id, from, i64::MAX)
        } else {
            journal.events_by_persistence_id(&persistence_id, from, i64::MAX)
        };
    }
    if let Ok(tag) = std::env::var("TAIL_TAG") {
        info!(tag = %tag, "Tailing tag");
        return if current {
            journal.current_events_by_tag(&tag, offset)
        } else {
            journal.events_by_tag(&tag, offset)
        };
    }
    info!("Tailing all events");
    if current {
        journal.current_all_events(offset)
    } else {
        journal.all_events(offset)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    bootstrap::init_tracing();

    let config_path = bootstrap::parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting sqljournal-tail");

    let dao = bootstrap::connect_with_retry("journal storage", RetryPolicy::default(), || {
        init_storage(&config)
    })
    .await?;

    let offset: i64 = match std::env::var("TAIL_OFFSET") {
        Ok(raw) => raw.parse()?,
        Err(_) => 0,
    };
    let current = env_flag("TAIL_CURRENT");

    let journal = ReadJournal::new(dao, config.query.clone());
    let mut stream = open_stream(&journal, offset, current);

    loop {
        tokio::select! {
            item = stream.next() => match item {
                Some(Ok(row)) => info!(
                    ordering = row.ordering,
                    persistence_id = %row.persistence_id,
                    sequence_number = row.sequence_number,
                    manifest = %row.manifest,
                    tags = ?row.tags,
                    bytes = row.message.len(),
                    "event"
                ),
                Some(Err(e)) => warn!(error = %e, "Poll failed"),
                None => {
                    info!("Reached end of journal");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                journal.shutdown();
                break;
            }
        }
    }

    Ok(())
}
