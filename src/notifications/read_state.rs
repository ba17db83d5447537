//! Read/unread watermark access and user-driven acknowledgement.

use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;

use crate::account::AccountSettingsStore;

use super::aggregator::NotificationAggregator;
use super::models::NotificationClass;

/// Errors raised by [`ReadStateController::mark_read`].
#[derive(Debug, Error)]
pub enum ReadStateError {
    /// No notification state was ever aggregated for the account; calling
    /// mark-read before the first batch is a caller bug.
    #[error("no notification state for account {0}")]
    UnknownAccount(String),

    #[error("failed to persist read watermark: {0}")]
    Watermark(#[source] anyhow::Error),
}

/// Per-account, per-class read watermark, persisted through the settings
/// collaborator.
///
/// Every call is a pass-through; the store itself is the source of truth and
/// nothing is cached here.
pub struct ReadWatermarkStore {
    settings: Arc<dyn AccountSettingsStore>,
}

impl ReadWatermarkStore {
    pub fn new(settings: Arc<dyn AccountSettingsStore>) -> Self {
        Self { settings }
    }

    /// Returns the watermark for the account/class, or None if the user never
    /// acknowledged that class (including accounts with no settings at all).
    pub fn get(&self, account_id: &str, class: NotificationClass) -> Result<Option<String>> {
        let settings = self.settings.get_settings(account_id)?;
        Ok(match class {
            NotificationClass::Mention => settings.last_mention_read_at,
            NotificationClass::General => settings.last_notification_read_at,
        })
    }

    /// Moves the watermark for the account/class to `created_at`.
    pub fn set(&self, account_id: &str, class: NotificationClass, created_at: &str) -> Result<()> {
        let mut settings = self.settings.get_settings(account_id)?;
        let slot = match class {
            NotificationClass::Mention => &mut settings.last_mention_read_at,
            NotificationClass::General => &mut settings.last_notification_read_at,
        };
        *slot = Some(created_at.to_string());
        self.settings.save_settings(account_id, &settings)
    }
}

/// User-facing acknowledgement entry point.
///
/// A thin command surface over the aggregator: marking a class as read
/// advances the persisted watermark to the newest aggregated record and
/// clears the unread flag.
pub struct ReadStateController {
    aggregator: Arc<NotificationAggregator>,
}

impl ReadStateController {
    pub fn new(aggregator: Arc<NotificationAggregator>) -> Self {
        Self { aggregator }
    }

    /// Acknowledge every currently-aggregated record of the class.
    ///
    /// No-op when the account has an empty list for the class; idempotent
    /// when called twice in a row.
    pub fn mark_read(
        &self,
        account_id: &str,
        class: NotificationClass,
    ) -> Result<(), ReadStateError> {
        self.aggregator.mark_read(account_id, class)
    }
}
