//! Notification aggregation engine.
//!
//! Owns the in-memory per-account notification history, merges incoming
//! batches from the catch-up fetcher and the live-update bridges, decides
//! unread transitions against the persisted watermarks, and publishes the
//! aggregated state to subscribers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::account::{Account, AccountSettingsStore};

use super::models::{
    compare_ids, AccountNotifications, NotificationClass, NotificationRecord, UnreadTransition,
};
use super::read_state::{ReadStateError, ReadWatermarkStore};

/// Full aggregated state of all accounts, in account insertion order.
pub type AggregatedSnapshot = Vec<AccountNotifications>;

/// The single writer of aggregated notification state.
///
/// All mutation is serialized behind one mutex; every ingestion is a pure
/// in-memory merge plus at most one settings write, so the critical section
/// stays short and the live-update delivery loops are never blocked for
/// long. Published snapshots are value clones, so subscribers always observe
/// a fully merged state.
pub struct NotificationAggregator {
    watermarks: ReadWatermarkStore,
    inner: Mutex<AggregatorInner>,
    snapshot_tx: watch::Sender<AggregatedSnapshot>,
    transitions_tx: broadcast::Sender<UnreadTransition>,
}

#[derive(Default)]
struct AggregatorInner {
    accounts: HashMap<String, AccountNotifications>,
    /// Account ids in first-seen order; snapshots preserve it.
    order: Vec<String>,
}

impl AggregatorInner {
    fn snapshot(&self) -> AggregatedSnapshot {
        self.order
            .iter()
            .filter_map(|id| self.accounts.get(id))
            .cloned()
            .collect()
    }
}

impl NotificationAggregator {
    pub fn new(settings: Arc<dyn AccountSettingsStore>) -> Self {
        let (snapshot_tx, _) = watch::channel(AggregatedSnapshot::new());
        let (transitions_tx, _) = broadcast::channel(64);

        Self {
            watermarks: ReadWatermarkStore::new(settings),
            inner: Mutex::new(AggregatorInner::default()),
            snapshot_tx,
            transitions_tx,
        }
    }

    /// Merge a batch of records into the account's history for the class.
    ///
    /// An empty batch is a strict no-op. Otherwise the incoming records are
    /// merged in front of the retained history, duplicates are collapsed by
    /// id (the incoming record wins, treating it as an authoritative
    /// refresh), and the list is re-sorted by descending id so the order
    /// invariant survives out-of-order live deliveries.
    ///
    /// When no watermark exists yet for the account/class, it is seeded with
    /// the newest incoming record's timestamp and the class is left read:
    /// history discovered on first run is not news. A snapshot is published
    /// only when the account is new or an unread flag transitioned to true.
    ///
    /// Never fails: settings-store errors are logged and degrade to "not
    /// newer".
    pub fn ingest_batch(
        &self,
        account: &Account,
        class: NotificationClass,
        records: Vec<NotificationRecord>,
    ) {
        let Some(batch_newest) = records
            .iter()
            .max_by(|a, b| compare_ids(&a.id, &b.id))
            .cloned()
        else {
            return;
        };

        let mut inner = self.inner.lock().unwrap();

        let is_new_account = !inner.accounts.contains_key(&account.id);
        if is_new_account {
            inner.order.push(account.id.clone());
        }
        let state = inner
            .accounts
            .entry(account.id.clone())
            .or_insert_with(|| AccountNotifications::new(account.clone()));

        state.note_seen_id(class, &batch_newest.id);

        let existing = state.records_mut(class);
        let mut merged = records;
        let mut seen: HashSet<String> = merged.iter().map(|r| r.id.clone()).collect();
        for record in existing.drain(..) {
            if seen.insert(record.id.clone()) {
                merged.push(record);
            }
        }
        merged.sort_by(|a, b| compare_ids(&b.id, &a.id));
        *existing = merged;

        let has_new = match self.watermarks.get(&account.id, class) {
            Err(e) => {
                warn!(
                    "Failed to read {} watermark for account {}: {}",
                    class.as_str(),
                    account.id,
                    e
                );
                false
            }
            Ok(None) => {
                // First run for this account/class: seed the watermark with
                // the newest incoming record so pre-existing history does not
                // show up as unread.
                if let Err(e) =
                    self.watermarks
                        .set(&account.id, class, &batch_newest.created_at)
                {
                    warn!(
                        "Failed to seed {} watermark for account {}: {}",
                        class.as_str(),
                        account.id,
                        e
                    );
                }
                false
            }
            Ok(Some(watermark)) => is_newer(state.records(class).first(), &watermark),
        };

        let was_unread = state.has_new(class);
        state.set_has_new(class, has_new);
        let became_unread = has_new && !was_unread;

        if became_unread {
            debug!(
                "Account {} has new unread {}s",
                account.id,
                class.as_str()
            );
            let _ = self.transitions_tx.send(UnreadTransition {
                account_id: account.id.clone(),
                class,
            });
        }

        if is_new_account || became_unread {
            self.publish(&inner);
        }
    }

    /// Advance the class watermark to the newest aggregated record and clear
    /// the unread flag.
    ///
    /// Called through [`super::ReadStateController`]. No-op when the class
    /// list is empty; an account with no aggregated state at all is a caller
    /// contract violation and yields [`ReadStateError::UnknownAccount`].
    pub fn mark_read(
        &self,
        account_id: &str,
        class: NotificationClass,
    ) -> Result<(), ReadStateError> {
        let mut inner = self.inner.lock().unwrap();

        let cleared = {
            let state = inner
                .accounts
                .get_mut(account_id)
                .ok_or_else(|| ReadStateError::UnknownAccount(account_id.to_string()))?;

            let Some(newest) = state.records(class).first().cloned() else {
                return Ok(());
            };

            self.watermarks
                .set(account_id, class, &newest.created_at)
                .map_err(ReadStateError::Watermark)?;

            if state.has_new(class) {
                state.set_has_new(class, false);
                true
            } else {
                false
            }
        };

        if cleared {
            self.publish(&inner);
        }
        Ok(())
    }

    /// Current aggregated state, built from the authoritative map (which may
    /// be ahead of the last published snapshot).
    pub fn snapshot(&self) -> AggregatedSnapshot {
        self.inner.lock().unwrap().snapshot()
    }

    /// Latest-value subscription: the receiver immediately observes the most
    /// recently published snapshot, then every one published afterwards.
    pub fn subscribe(&self) -> watch::Receiver<AggregatedSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Subscription to unread false-to-true transitions.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<UnreadTransition> {
        self.transitions_tx.subscribe()
    }

    /// The live-update resume point for an account: the highest id observed
    /// across both classes this session.
    pub fn resume_point(&self, account_id: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .accounts
            .get(account_id)
            .and_then(|state| state.resume_point().map(str::to_string))
    }

    /// Drop an account's in-memory history (after deregistration).
    pub fn purge_account(&self, account_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.accounts.remove(account_id).is_some() {
            inner.order.retain(|id| id != account_id);
            self.publish(&inner);
        }
    }

    fn publish(&self, inner: &AggregatorInner) {
        self.snapshot_tx.send_replace(inner.snapshot());
    }
}

/// True when the record exists and is strictly newer than the watermark.
/// Unparsable timestamps on either side count as "not newer".
fn is_newer(record: Option<&NotificationRecord>, watermark: &str) -> bool {
    let Some(record) = record else {
        return false;
    };
    let Some(created) = record.created_at_utc() else {
        return false;
    };
    let Ok(mark) = DateTime::parse_from_rfc3339(watermark) else {
        return false;
    };
    created > mark.with_timezone(&Utc)
}
