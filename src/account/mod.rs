//! Account identity and per-account persisted settings.

mod settings;
mod sqlite_settings_store;

pub use settings::AccountSettings;
pub use sqlite_settings_store::SqliteAccountSettingsStore;

use anyhow::Result;

/// One authenticated remote account the daemon watches.
///
/// The account registry itself (adding/removing accounts, credential
/// management) lives in configuration; this struct is just the identity
/// handed around by the aggregation core and the transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Local name uniquely identifying the account, e.g. "work".
    pub id: String,
    /// Instance host the account lives on, e.g. "mastodon.social".
    pub instance: String,
    /// Bearer token used by the transports.
    pub access_token: String,
}

impl Account {
    pub fn new(id: impl Into<String>, instance: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            instance: instance.into(),
            access_token: access_token.into(),
        }
    }
}

/// Persistence for per-account settings.
///
/// The store must be safe to query for accounts that were never saved.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait AccountSettingsStore: Send + Sync {
    /// Returns the stored settings for the account.
    /// Returns default settings if the account was never saved.
    /// Returns Err if there is a database error.
    fn get_settings(&self, account_id: &str) -> Result<AccountSettings>;

    /// Saves the settings for the account, replacing any previous value.
    fn save_settings(&self, account_id: &str, settings: &AccountSettings) -> Result<()>;
}
