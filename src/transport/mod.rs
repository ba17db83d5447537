//! Transport collaborator contracts.
//!
//! The aggregation core never talks to the network itself: it consumes these
//! traits, and the concrete Mastodon implementations live in
//! [`mastodon`]. Tests substitute recording fakes (or `mockall` mocks behind
//! the `mock` feature).

pub mod mastodon;
mod reconnect;

pub use mastodon::{MastodonGateway, MastodonLiveSource};
pub use reconnect::ReconnectPolicy;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use crate::account::Account;
use crate::notifications::NotificationRecord;

/// Errors raised by the transport layer.
///
/// These stop at the adapter boundary: adapters report them through a
/// [`TransportErrorSink`] and the aggregation core never sees them.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("failed to decode stream payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("live update stream closed")]
    StreamClosed,
}

/// Kind of event delivered on a live-update stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveEventKind {
    /// A new notification arrived; `LiveUpdate::notification` carries it.
    Notification,
    /// A status edit; ignored by the aggregation core.
    Update,
    /// A status deletion; ignored by the aggregation core.
    Delete,
    /// Anything else the stream may emit.
    Other,
}

impl LiveEventKind {
    pub fn from_event_name(name: &str) -> Self {
        match name {
            "notification" => Self::Notification,
            "update" => Self::Update,
            "delete" => Self::Delete,
            _ => Self::Other,
        }
    }
}

/// One event delivered on a live-update stream.
#[derive(Debug, Clone)]
pub struct LiveUpdate {
    pub event: LiveEventKind,
    /// The carried record; may be absent on malformed frames, in which case
    /// the bridge drops the event.
    pub notification: Option<NotificationRecord>,
}

/// Paged notification fetch against a remote account.
// Not automocked: mockall cannot handle the `&[&str]` kinds argument. Tests
// use hand-rolled fakes instead.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Fetches up to `limit` notifications, newest first.
    ///
    /// `kinds` filters by subtype; an empty slice means no filter. `max_id`
    /// and `since_id` bound the page the way the remote API does.
    async fn fetch_notifications(
        &self,
        account: &Account,
        kinds: &[&str],
        max_id: Option<&str>,
        since_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, TransportError>;
}

/// Long-lived per-account live-update feed.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait LiveUpdateSource: Send + Sync {
    /// Opens the feed, resuming after `resume_from_id` so already-seen events
    /// are not replayed.
    ///
    /// The returned receiver yields events until the consumer drops it or the
    /// feed ends for good. Reconnection and backoff are the implementation's
    /// responsibility; an error here means setup itself failed.
    async fn open(
        &self,
        account: &Account,
        resume_from_id: Option<String>,
    ) -> Result<mpsc::Receiver<LiveUpdate>, TransportError>;
}

/// Fire-and-forget sink for transport failures.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait TransportErrorSink: Send + Sync {
    fn report_transport_error(&self, account: &Account, error: &TransportError);
}

/// Default sink: logs the failure and moves on.
pub struct LoggingErrorSink;

impl TransportErrorSink for LoggingErrorSink {
    fn report_transport_error(&self, account: &Account, error: &TransportError) {
        warn!("Transport error for account {}: {}", account.id, error);
    }
}
