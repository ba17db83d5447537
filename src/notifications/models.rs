//! Notification data models.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::Account;

/// Subtype strings fetched for the mention class.
pub const MENTION_KINDS: &[&str] = &["mention"];

/// Subtype strings fetched for the general class.
pub const GENERAL_KINDS: &[&str] = &["favourite", "follow", "reblog", "poll"];

/// The two-way partition of notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationClass {
    Mention,
    General,
}

impl NotificationClass {
    /// Classify a notification by its originating subtype.
    pub fn from_kind(kind: &str) -> Self {
        if kind == "mention" {
            Self::Mention
        } else {
            Self::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mention => "mention",
            Self::General => "general",
        }
    }
}

/// One notification event for one account.
///
/// `id` and `created_at` are kept as the strings they arrive with; remote ids
/// are numeric in practice but treated as opaque, and timestamps are parsed
/// lazily so a malformed value degrades to "not newer" instead of failing
/// ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: String,
    /// Remaining fields of the wire object (status, account, ...), passed
    /// through unchanged.
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

impl NotificationRecord {
    pub fn class(&self) -> NotificationClass {
        NotificationClass::from_kind(&self.kind)
    }

    /// Event timestamp, or `None` when the transported value is unparsable.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Orders opaque record ids.
///
/// Ids are compared numerically when both sides parse as integers (the
/// normal case) and lexicographically otherwise.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

/// Emitted when an account's unread flag flips from false to true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadTransition {
    pub account_id: String,
    pub class: NotificationClass,
}

/// Aggregated notification state for one account.
#[derive(Debug, Clone)]
pub struct AccountNotifications {
    pub account: Account,

    /// Mention records, newest first, unique by id.
    pub mentions: Vec<NotificationRecord>,
    /// General records, newest first, unique by id.
    pub notifications: Vec<NotificationRecord>,

    /// Highest mention id observed this session.
    pub last_mentions_id: Option<String>,
    /// Highest general notification id observed this session.
    pub last_notifications_id: Option<String>,

    pub has_new_mentions: bool,
    pub has_new_notifications: bool,
}

impl AccountNotifications {
    pub fn new(account: Account) -> Self {
        Self {
            account,
            mentions: Vec::new(),
            notifications: Vec::new(),
            last_mentions_id: None,
            last_notifications_id: None,
            has_new_mentions: false,
            has_new_notifications: false,
        }
    }

    pub fn records(&self, class: NotificationClass) -> &[NotificationRecord] {
        match class {
            NotificationClass::Mention => &self.mentions,
            NotificationClass::General => &self.notifications,
        }
    }

    pub(crate) fn records_mut(&mut self, class: NotificationClass) -> &mut Vec<NotificationRecord> {
        match class {
            NotificationClass::Mention => &mut self.mentions,
            NotificationClass::General => &mut self.notifications,
        }
    }

    pub fn has_new(&self, class: NotificationClass) -> bool {
        match class {
            NotificationClass::Mention => self.has_new_mentions,
            NotificationClass::General => self.has_new_notifications,
        }
    }

    pub(crate) fn set_has_new(&mut self, class: NotificationClass, value: bool) {
        match class {
            NotificationClass::Mention => self.has_new_mentions = value,
            NotificationClass::General => self.has_new_notifications = value,
        }
    }

    /// Record an id as seen, keeping the per-class maximum.
    pub(crate) fn note_seen_id(&mut self, class: NotificationClass, id: &str) {
        let slot = match class {
            NotificationClass::Mention => &mut self.last_mentions_id,
            NotificationClass::General => &mut self.last_notifications_id,
        };
        match slot {
            Some(current) if compare_ids(current, id) != Ordering::Less => {}
            _ => *slot = Some(id.to_string()),
        }
    }

    /// The id a live-update subscription should resume from: the highest id
    /// observed across both classes this session.
    pub fn resume_point(&self) -> Option<&str> {
        match (&self.last_mentions_id, &self.last_notifications_id) {
            (Some(m), Some(n)) => {
                if compare_ids(m, n) == Ordering::Less {
                    Some(n)
                } else {
                    Some(m)
                }
            }
            (Some(m), None) => Some(m),
            (None, Some(n)) => Some(n),
            (None, None) => None,
        }
    }
}
