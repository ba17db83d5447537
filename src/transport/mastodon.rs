//! Mastodon transport implementations.
//!
//! [`MastodonGateway`] covers the paged REST fetch, [`MastodonLiveSource`]
//! the server-sent-events streaming endpoint. Both authenticate with the
//! account's bearer token.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::account::Account;
use crate::notifications::{compare_ids, NotificationRecord};

use super::{
    LiveEventKind, LiveUpdate, LiveUpdateSource, NotificationGateway, ReconnectPolicy,
    TransportError,
};

/// Page size used when replaying notifications missed while disconnected.
const REPLAY_PAGE_SIZE: usize = 30;

/// HTTP client for the Mastodon notifications REST API.
pub struct MastodonGateway {
    client: reqwest::Client,
}

impl MastodonGateway {
    /// Create a new gateway.
    ///
    /// # Arguments
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(timeout_sec: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }
}

#[async_trait]
impl NotificationGateway for MastodonGateway {
    async fn fetch_notifications(
        &self,
        account: &Account,
        kinds: &[&str],
        max_id: Option<&str>,
        since_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NotificationRecord>, TransportError> {
        let mut url = format!(
            "https://{}/api/v1/notifications?limit={}",
            account.instance, limit
        );
        for kind in kinds {
            url.push_str("&types[]=");
            url.push_str(&urlencoding::encode(kind));
        }
        if let Some(max_id) = max_id {
            url.push_str("&max_id=");
            url.push_str(&urlencoding::encode(max_id));
        }
        if let Some(since_id) = since_id {
            url.push_str("&since_id=");
            url.push_str(&urlencoding::encode(since_id));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(&account.access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::Status {
                status: response.status().as_u16(),
                url,
            });
        }

        Ok(response.json().await?)
    }
}

/// Live-update source over the Mastodon SSE streaming endpoint.
///
/// The first connection is established in [`LiveUpdateSource::open`] so a bad
/// host or token fails loudly; afterwards an internal pump task reconnects
/// with exponential backoff and replays anything missed through the REST API
/// (`since_id`), so the consumer sees one uninterrupted stream.
pub struct MastodonLiveSource {
    client: reqwest::Client,
    gateway: Arc<MastodonGateway>,
    reconnect: ReconnectPolicy,
}

impl MastodonLiveSource {
    pub fn new(gateway: Arc<MastodonGateway>, reconnect: ReconnectPolicy) -> Self {
        // No overall timeout here: the streaming response stays open for the
        // lifetime of the subscription.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            gateway,
            reconnect,
        }
    }
}

#[async_trait]
impl LiveUpdateSource for MastodonLiveSource {
    async fn open(
        &self,
        account: &Account,
        resume_from_id: Option<String>,
    ) -> Result<mpsc::Receiver<LiveUpdate>, TransportError> {
        let response = connect(&self.client, account).await?;

        let (tx, rx) = mpsc::channel(32);
        let pump = StreamPump {
            client: self.client.clone(),
            gateway: self.gateway.clone(),
            reconnect: self.reconnect.clone(),
            account: account.clone(),
            last_seen_id: resume_from_id,
            tx,
        };
        tokio::spawn(pump.run(response));

        Ok(rx)
    }
}

async fn connect(
    client: &reqwest::Client,
    account: &Account,
) -> Result<reqwest::Response, TransportError> {
    let url = format!("https://{}/api/v1/streaming/user", account.instance);
    let response = client
        .get(&url)
        .bearer_auth(&account.access_token)
        .header("Accept", "text/event-stream")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(TransportError::Status {
            status: response.status().as_u16(),
            url,
        });
    }

    Ok(response)
}

/// Drives one account's SSE stream, reconnecting forever until the consumer
/// drops the receiver.
struct StreamPump {
    client: reqwest::Client,
    gateway: Arc<MastodonGateway>,
    reconnect: ReconnectPolicy,
    account: Account,
    last_seen_id: Option<String>,
    tx: mpsc::Sender<LiveUpdate>,
}

impl StreamPump {
    async fn run(mut self, mut response: reqwest::Response) {
        loop {
            if !self.replay_missed().await {
                return;
            }

            if !self.drain(response).await {
                return;
            }

            warn!(
                "Live update stream for account {} ended, reconnecting",
                self.account.id
            );

            response = match self.reconnect_with_backoff().await {
                Some(response) => response,
                None => return,
            };
        }
    }

    /// Fetch and emit notifications that arrived while not connected.
    /// Returns false when the consumer is gone.
    async fn replay_missed(&mut self) -> bool {
        let Some(since_id) = self.last_seen_id.clone() else {
            return true;
        };

        let missed = self
            .gateway
            .fetch_notifications(
                &self.account,
                &[],
                None,
                Some(since_id.as_str()),
                REPLAY_PAGE_SIZE,
            )
            .await;

        match missed {
            Ok(records) => {
                if !records.is_empty() {
                    debug!(
                        "Replaying {} missed notifications for account {}",
                        records.len(),
                        self.account.id
                    );
                }
                // The API returns newest first; emit in arrival order.
                for record in records.into_iter().rev() {
                    self.note_seen(&record.id);
                    let update = LiveUpdate {
                        event: LiveEventKind::Notification,
                        notification: Some(record),
                    };
                    if self.tx.send(update).await.is_err() {
                        return false;
                    }
                }
                true
            }
            Err(e) => {
                warn!(
                    "Failed to replay missed notifications for account {}: {}",
                    self.account.id, e
                );
                true
            }
        }
    }

    /// Forward frames from one connection. Returns false when the consumer
    /// dropped the receiver, true when the connection ended and a reconnect
    /// is in order.
    async fn drain(&mut self, response: reqwest::Response) -> bool {
        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!(
                        "Live update stream read error for account {}: {}",
                        self.account.id, e
                    );
                    return true;
                }
            };

            // SSE is line-oriented; carriage returns only get in the way.
            buffer.push_str(&String::from_utf8_lossy(&chunk).replace('\r', ""));

            for frame in drain_frames(&mut buffer) {
                let event = LiveEventKind::from_event_name(&frame.event);
                let notification = if event == LiveEventKind::Notification {
                    match serde_json::from_str::<NotificationRecord>(&frame.data) {
                        Ok(record) => {
                            self.note_seen(&record.id);
                            Some(record)
                        }
                        Err(e) => {
                            warn!(
                                "Undecodable notification frame for account {}: {}",
                                self.account.id,
                                TransportError::Decode(e)
                            );
                            None
                        }
                    }
                } else {
                    None
                };

                if self.tx.send(LiveUpdate { event, notification }).await.is_err() {
                    return false;
                }
            }
        }

        true
    }

    /// Reconnect with backoff. Returns None when the consumer is gone.
    async fn reconnect_with_backoff(&self) -> Option<reqwest::Response> {
        let mut attempt: u32 = 0;
        loop {
            let delay = self.reconnect.backoff_secs(attempt);
            debug!(
                "Reconnecting live stream for account {} in {}s (attempt {})",
                self.account.id,
                delay,
                attempt + 1
            );
            tokio::time::sleep(Duration::from_secs(delay)).await;

            if self.tx.is_closed() {
                return None;
            }

            match connect(&self.client, &self.account).await {
                Ok(response) => return Some(response),
                Err(e) => {
                    warn!(
                        "Live stream reconnect failed for account {}: {}",
                        self.account.id, e
                    );
                    attempt += 1;
                }
            }
        }
    }

    fn note_seen(&mut self, id: &str) {
        match &self.last_seen_id {
            Some(current) if compare_ids(current, id) != Ordering::Less => {}
            _ => self.last_seen_id = Some(id.to_string()),
        }
    }
}

/// One parsed server-sent event.
#[derive(Debug, PartialEq, Eq)]
struct SseFrame {
    event: String,
    data: String,
}

/// Remove and parse every complete (blank-line terminated) frame from the
/// buffer, leaving any trailing partial frame in place.
fn drain_frames(buffer: &mut String) -> Vec<SseFrame> {
    let mut frames = Vec::new();
    while let Some(pos) = buffer.find("\n\n") {
        let raw: String = buffer.drain(..pos + 2).collect();
        if let Some(frame) = parse_frame(&raw) {
            frames.push(frame);
        }
    }
    frames
}

fn parse_frame(raw: &str) -> Option<SseFrame> {
    let mut event = String::from("message");
    let mut data: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if line.is_empty() || line.starts_with(':') {
            // Comment lines are the streaming API's keepalives (":thump").
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => event = value.to_string(),
            "data" => data.push(value),
            _ => {}
        }
    }

    if data.is_empty() {
        return None;
    }

    Some(SseFrame {
        event,
        data: data.join("\n"),
    })
}
