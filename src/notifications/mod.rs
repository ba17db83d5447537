//! Multi-account notification aggregation.
//!
//! The aggregator is the single writer of all aggregated state; the catch-up
//! fetcher and the live-update bridges are its producers, the read-state
//! controller its user-driven entry point, and the alerter a subscriber of
//! its unread transitions.

mod aggregator;
mod alerts;
mod catch_up;
mod live_update;
mod manager;
mod models;
mod read_state;

pub use aggregator::{AggregatedSnapshot, NotificationAggregator};
pub use alerts::{AlertSink, NewUnreadAlerter, TerminalBellAlert};
pub use catch_up::CatchUpFetcher;
pub use live_update::LiveUpdateBridge;
pub use manager::NotificationSyncManager;
pub use models::{
    compare_ids, AccountNotifications, NotificationClass, NotificationRecord, UnreadTransition,
    GENERAL_KINDS, MENTION_KINDS,
};
pub use read_state::{ReadStateController, ReadStateError, ReadWatermarkStore};
