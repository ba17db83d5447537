//! Audible alert on new unread notifications.
//!
//! The alerter is a plain subscriber of the aggregator's unread transitions;
//! the merge logic knows nothing about it. The actual noise is behind the
//! [`AlertSink`] trait so it stays a fire-and-forget side effect.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::models::UnreadTransition;

/// Fire-and-forget alert side effect.
pub trait AlertSink: Send + Sync {
    fn alert(&self);
}

/// Rings the terminal bell.
pub struct TerminalBellAlert;

impl AlertSink for TerminalBellAlert {
    fn alert(&self) {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(b"\x07");
        let _ = stdout.flush();
    }
}

/// Debounced alert trigger.
///
/// Keeps its own "recently played" state so a burst of transitions (e.g. a
/// reconnect replaying several accounts at once) produces a single alert.
pub struct NewUnreadAlerter {
    sink: Arc<dyn AlertSink>,
    min_interval: Duration,
    last_alert: Mutex<Option<Instant>>,
}

impl NewUnreadAlerter {
    pub fn new(sink: Arc<dyn AlertSink>, min_interval: Duration) -> Self {
        Self {
            sink,
            min_interval,
            last_alert: Mutex::new(None),
        }
    }

    /// Handle one transition. Returns whether the sink was triggered.
    pub fn on_transition(&self, transition: &UnreadTransition) -> bool {
        let mut last_alert = self.last_alert.lock().unwrap();
        if let Some(last) = *last_alert {
            if last.elapsed() < self.min_interval {
                debug!(
                    "Suppressing alert for account {} ({} still within debounce window)",
                    transition.account_id,
                    transition.class.as_str()
                );
                return false;
            }
        }
        *last_alert = Some(Instant::now());
        drop(last_alert);

        self.sink.alert();
        true
    }

    /// Consume unread transitions until the aggregator goes away.
    pub fn spawn(self: Arc<Self>, mut transitions: broadcast::Receiver<UnreadTransition>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match transitions.recv().await {
                    Ok(transition) => {
                        self.on_transition(&transition);
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Alerts are best-effort; missing some is fine.
                        warn!("Alerter lagged behind, skipped {} transitions", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
