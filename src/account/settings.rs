//! Per-account settings model.
//!
//! The settings currently consist of the two read watermarks, one per
//! notification class. A watermark is the `created_at` of the most recent
//! record the user has acknowledged, kept as the RFC3339 string it arrived
//! with so round-tripping through storage never reformats it.

use serde::{Deserialize, Serialize};

/// Settings persisted for one account.
///
/// A `None` watermark means the user never acknowledged that class and no
/// fetch has seeded it yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSettings {
    /// Creation timestamp of the last acknowledged mention.
    pub last_mention_read_at: Option<String>,
    /// Creation timestamp of the last acknowledged general notification.
    pub last_notification_read_at: Option<String>,
}
