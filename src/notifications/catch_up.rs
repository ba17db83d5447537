//! Catch-up fetcher.
//!
//! On startup (and whenever an account is (re)started) pulls the most recent
//! page of each notification class for the account and feeds it to the
//! aggregator, so the live-update bridge only has to cover what happens from
//! then on.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::account::Account;
use crate::transport::{NotificationGateway, TransportError, TransportErrorSink};

use super::aggregator::NotificationAggregator;
use super::models::{NotificationClass, NotificationRecord, GENERAL_KINDS, MENTION_KINDS};

/// Fetches the recent notification pages for an account.
///
/// The two class fetches are independent and run concurrently, but both are
/// joined before the resume point is computed, since that depends on the
/// latest-seen ids of both classes. Failures are reported to the error sink
/// and not retried within the cycle; a failing account never blocks others.
pub struct CatchUpFetcher {
    gateway: Arc<dyn NotificationGateway>,
    aggregator: Arc<NotificationAggregator>,
    error_sink: Arc<dyn TransportErrorSink>,
    page_size: usize,
}

impl CatchUpFetcher {
    pub fn new(
        gateway: Arc<dyn NotificationGateway>,
        aggregator: Arc<NotificationAggregator>,
        error_sink: Arc<dyn TransportErrorSink>,
        page_size: usize,
    ) -> Self {
        Self {
            gateway,
            aggregator,
            error_sink,
            page_size,
        }
    }

    /// Run one catch-up cycle for the account and return the id the
    /// live-update subscription should resume from.
    pub async fn catch_up(&self, account: &Account) -> Option<String> {
        let mentions = self
            .gateway
            .fetch_notifications(account, MENTION_KINDS, None, None, self.page_size);
        let general = self
            .gateway
            .fetch_notifications(account, GENERAL_KINDS, None, None, self.page_size);

        let (mentions, general) = tokio::join!(mentions, general);

        self.ingest(account, NotificationClass::Mention, mentions);
        self.ingest(account, NotificationClass::General, general);

        self.aggregator.resume_point(&account.id)
    }

    fn ingest(
        &self,
        account: &Account,
        class: NotificationClass,
        fetched: Result<Vec<NotificationRecord>, TransportError>,
    ) {
        match fetched {
            Ok(records) => {
                debug!(
                    "Fetched {} {} records for account {}",
                    records.len(),
                    class.as_str(),
                    account.id
                );
                self.aggregator.ingest_batch(account, class, records);
            }
            Err(e) => {
                warn!(
                    "Catch-up fetch of {}s failed for account {}: {}",
                    class.as_str(),
                    account.id,
                    e
                );
                self.error_sink.report_transport_error(account, &e);
            }
        }
    }
}
