//! Per-account notification sync lifecycle.
//!
//! For every watched account: run the catch-up cycle, then keep a live-update
//! bridge task running until the account is stopped or the daemon shuts
//! down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::account::Account;
use crate::transport::TransportErrorSink;

use super::aggregator::NotificationAggregator;
use super::catch_up::CatchUpFetcher;
use super::live_update::LiveUpdateBridge;

/// Starts and stops the per-account sync pipelines.
pub struct NotificationSyncManager {
    fetcher: CatchUpFetcher,
    bridge: Arc<LiveUpdateBridge>,
    aggregator: Arc<NotificationAggregator>,
    error_sink: Arc<dyn TransportErrorSink>,
    tasks: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl NotificationSyncManager {
    pub fn new(
        fetcher: CatchUpFetcher,
        bridge: Arc<LiveUpdateBridge>,
        aggregator: Arc<NotificationAggregator>,
        error_sink: Arc<dyn TransportErrorSink>,
    ) -> Self {
        Self {
            fetcher,
            bridge,
            aggregator,
            error_sink,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Catch up on recent notifications, then keep the account live.
    ///
    /// The live-update subscription is seeded with the resume point computed
    /// after both catch-up fetches have completed. Restarting an account
    /// replaces its previous bridge task.
    pub async fn start_account(&self, account: Account) {
        info!("Starting notification sync for account {}", account.id);

        let resume_from_id = self.fetcher.catch_up(&account).await;

        let bridge = self.bridge.clone();
        let error_sink = self.error_sink.clone();
        let account_id = account.id.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = bridge.run(account.clone(), resume_from_id).await {
                warn!("Live update bridge for account {} failed: {}", account.id, e);
                error_sink.report_transport_error(&account, &e);
            }
        });

        if let Some(previous) = self.tasks.lock().unwrap().insert(account_id, handle) {
            previous.abort();
        }
    }

    /// Start every account concurrently; accounts do not wait on each other.
    pub async fn start_all(&self, accounts: Vec<Account>) {
        join_all(accounts.into_iter().map(|account| self.start_account(account))).await;
    }

    /// Stop an account's live subscription.
    ///
    /// In-memory history is kept unless `purge` is set; watermarks are
    /// persisted either way.
    pub fn stop_account(&self, account_id: &str, purge: bool) {
        if let Some(handle) = self.tasks.lock().unwrap().remove(account_id) {
            handle.abort();
            info!("Stopped notification sync for account {}", account_id);
        }
        if purge {
            self.aggregator.purge_account(account_id);
        }
    }

    /// Abort all live subscriptions.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().unwrap();
        for (account_id, handle) in tasks.drain() {
            handle.abort();
            info!("Stopped notification sync for account {}", account_id);
        }
    }
}

impl Drop for NotificationSyncManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::super::models::{NotificationClass, NotificationRecord};
    use super::super::read_state::testing::MemorySettingsStore;
    use crate::transport::{
        LiveEventKind, LiveUpdate, LiveUpdateSource, NotificationGateway, TransportError,
    };

    use super::*;

    fn record(id: &str, kind: &str, created_at: &str) -> NotificationRecord {
        NotificationRecord {
            id: id.to_string(),
            kind: kind.to_string(),
            created_at: created_at.to_string(),
            payload: serde_json::Value::Null,
        }
    }

    struct StaticGateway {
        mentions: Vec<NotificationRecord>,
    }

    #[async_trait]
    impl NotificationGateway for StaticGateway {
        async fn fetch_notifications(
            &self,
            _account: &Account,
            kinds: &[&str],
            _max_id: Option<&str>,
            _since_id: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<NotificationRecord>, TransportError> {
            if kinds.contains(&"mention") {
                Ok(self.mentions.clone())
            } else {
                Ok(vec![])
            }
        }
    }

    /// Source that records resume points and delivers one scripted event.
    struct OneShotSource {
        resume_points: StdMutex<Vec<Option<String>>>,
        event: StdMutex<Option<LiveUpdate>>,
    }

    #[async_trait]
    impl LiveUpdateSource for OneShotSource {
        async fn open(
            &self,
            _account: &Account,
            resume_from_id: Option<String>,
        ) -> Result<mpsc::Receiver<LiveUpdate>, TransportError> {
            self.resume_points.lock().unwrap().push(resume_from_id);
            let (tx, rx) = mpsc::channel(1);
            if let Some(event) = self.event.lock().unwrap().take() {
                tx.try_send(event).unwrap();
            }
            Ok(rx)
        }
    }

    struct NullSink;

    impl TransportErrorSink for NullSink {
        fn report_transport_error(&self, _account: &Account, _error: &TransportError) {}
    }

    /// Wait until the spawned bridge task has ingested the given mention.
    async fn wait_for_mention(aggregator: &NotificationAggregator, id: &str) {
        for _ in 0..100 {
            let ingested = aggregator
                .snapshot()
                .first()
                .map(|state| state.mentions.iter().any(|r| r.id == id))
                .unwrap_or(false);
            if ingested {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("bridge never ingested mention {}", id);
    }

    fn make_manager(
        gateway: Arc<dyn NotificationGateway>,
        source: Arc<OneShotSource>,
    ) -> (NotificationSyncManager, Arc<NotificationAggregator>) {
        let aggregator = Arc::new(NotificationAggregator::new(Arc::new(
            MemorySettingsStore::new(),
        )));
        let error_sink: Arc<dyn TransportErrorSink> = Arc::new(NullSink);
        let fetcher = CatchUpFetcher::new(gateway, aggregator.clone(), error_sink.clone(), 10);
        let bridge = Arc::new(LiveUpdateBridge::new(source, aggregator.clone()));
        let manager = NotificationSyncManager::new(fetcher, bridge, aggregator.clone(), error_sink);
        (manager, aggregator)
    }

    #[tokio::test]
    async fn test_bridge_is_seeded_with_catch_up_resume_point() {
        let gateway = Arc::new(StaticGateway {
            mentions: vec![record("5", "mention", "2024-03-01T10:05:00.000Z")],
        });
        let source = Arc::new(OneShotSource {
            resume_points: StdMutex::new(Vec::new()),
            event: StdMutex::new(Some(LiveUpdate {
                event: LiveEventKind::Notification,
                notification: Some(record("6", "mention", "2024-03-01T10:06:00.000Z")),
            })),
        });
        let (manager, aggregator) = make_manager(gateway, source.clone());

        manager
            .start_account(Account::new("home", "mastodon.social", "token"))
            .await;

        wait_for_mention(&aggregator, "6").await;

        assert_eq!(
            *source.resume_points.lock().unwrap(),
            vec![Some("5".to_string())]
        );

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].mentions.iter().any(|r| r.id == "6"));
        assert!(snapshot[0].has_new_mentions);

        manager.shutdown();
    }

    #[tokio::test]
    async fn test_stop_account_keeps_history_unless_purged() {
        let gateway = Arc::new(StaticGateway {
            mentions: vec![record("5", "mention", "2024-03-01T10:05:00.000Z")],
        });
        let source = Arc::new(OneShotSource {
            resume_points: StdMutex::new(Vec::new()),
            event: StdMutex::new(None),
        });
        let (manager, aggregator) = make_manager(gateway, source);

        manager
            .start_account(Account::new("home", "mastodon.social", "token"))
            .await;

        manager.stop_account("home", false);
        assert_eq!(aggregator.snapshot().len(), 1);

        manager.stop_account("home", true);
        assert!(aggregator.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_through_controller_after_sync() {
        let gateway = Arc::new(StaticGateway {
            mentions: vec![record("5", "mention", "2024-03-01T10:05:00.000Z")],
        });
        let source = Arc::new(OneShotSource {
            resume_points: StdMutex::new(Vec::new()),
            event: StdMutex::new(Some(LiveUpdate {
                event: LiveEventKind::Notification,
                notification: Some(record("6", "mention", "2024-03-01T10:06:00.000Z")),
            })),
        });
        let (manager, aggregator) = make_manager(gateway, source);

        manager
            .start_account(Account::new("home", "mastodon.social", "token"))
            .await;
        wait_for_mention(&aggregator, "6").await;

        let controller = super::super::ReadStateController::new(aggregator.clone());
        controller
            .mark_read("home", NotificationClass::Mention)
            .unwrap();

        assert!(!aggregator.snapshot()[0].has_new_mentions);

        manager.shutdown();
    }
}
