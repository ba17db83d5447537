//! Live-update bridge.
//!
//! Connects one account's live-update feed to the aggregator: every
//! delivered notification becomes a single-element batch, classified the
//! same way as fetched records.

use std::sync::Arc;

use tracing::{debug, info};

use crate::account::Account;
use crate::transport::{LiveEventKind, LiveUpdateSource, TransportError};

use super::aggregator::NotificationAggregator;

/// Forwards live-update events into the aggregator.
pub struct LiveUpdateBridge {
    source: Arc<dyn LiveUpdateSource>,
    aggregator: Arc<NotificationAggregator>,
}

impl LiveUpdateBridge {
    pub fn new(source: Arc<dyn LiveUpdateSource>, aggregator: Arc<NotificationAggregator>) -> Self {
        Self { source, aggregator }
    }

    /// Open the feed and pump it until it ends.
    ///
    /// Setup failures are returned to the caller rather than swallowed, so
    /// a dead subscription is always observable. Events that are not
    /// notifications are ignored; notification events without a payload are
    /// dropped (malformed transport frames).
    pub async fn run(
        &self,
        account: Account,
        resume_from_id: Option<String>,
    ) -> Result<(), TransportError> {
        let mut events = self.source.open(&account, resume_from_id).await?;
        info!("Live updates connected for account {}", account.id);

        while let Some(update) = events.recv().await {
            if update.event != LiveEventKind::Notification {
                continue;
            }
            let Some(record) = update.notification else {
                debug!(
                    "Dropping live notification without payload for account {}",
                    account.id
                );
                continue;
            };

            let class = record.class();
            self.aggregator.ingest_batch(&account, class, vec![record]);
        }

        info!("Live updates ended for account {}", account.id);
        Ok(())
    }
}
