//! SQLite-backed account settings store.

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use super::settings::AccountSettings;
use super::AccountSettingsStore;

/// Schema version written to `PRAGMA user_version` so that an unrelated or
/// newer database file is rejected instead of silently misread.
const DB_VERSION: i64 = 1;

const CREATE_SETTINGS_TABLE: &str = "
CREATE TABLE account_settings (
    account_id TEXT PRIMARY KEY NOT NULL,
    last_mention_read_at TEXT,
    last_notification_read_at TEXT,
    updated INTEGER NOT NULL DEFAULT (cast(strftime('%s','now') as int))
);";

/// Account settings persisted in a single SQLite table.
pub struct SqliteAccountSettingsStore {
    connection: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteAccountSettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteAccountSettingsStore").finish()
    }
}

impl SqliteAccountSettingsStore {
    /// Opens (or creates) the settings database at the given path.
    ///
    /// A fresh database gets the schema created and stamped with
    /// [`DB_VERSION`]; an existing database with a different version is
    /// rejected.
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let connection = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open settings db at {:?}", db_path.as_ref()))?;
        Self::from_connection(connection)
    }

    /// In-memory store, used by tests.
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(connection: Connection) -> Result<Self> {
        let version: i64 = connection.query_row("PRAGMA user_version;", [], |row| row.get(0))?;

        match version {
            0 => {
                info!("Creating account settings schema (version {})", DB_VERSION);
                connection.execute(CREATE_SETTINGS_TABLE, params![])?;
                connection.execute(&format!("PRAGMA user_version = {}", DB_VERSION), params![])?;
            }
            DB_VERSION => {}
            other => bail!(
                "Unsupported settings db version {} (expected {})",
                other,
                DB_VERSION
            ),
        }

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }
}

impl AccountSettingsStore for SqliteAccountSettingsStore {
    fn get_settings(&self, account_id: &str) -> Result<AccountSettings> {
        let conn = self.connection.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT last_mention_read_at, last_notification_read_at
                 FROM account_settings WHERE account_id = ?1",
                params![account_id],
                |row| {
                    Ok(AccountSettings {
                        last_mention_read_at: row.get(0)?,
                        last_notification_read_at: row.get(1)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("Failed to load settings for account {}", account_id))?;

        Ok(row.unwrap_or_default())
    }

    fn save_settings(&self, account_id: &str, settings: &AccountSettings) -> Result<()> {
        let conn = self.connection.lock().unwrap();
        conn.execute(
            "INSERT INTO account_settings (account_id, last_mention_read_at, last_notification_read_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(account_id) DO UPDATE SET
                 last_mention_read_at = excluded.last_mention_read_at,
                 last_notification_read_at = excluded.last_notification_read_at,
                 updated = cast(strftime('%s','now') as int)",
            params![
                account_id,
                settings.last_mention_read_at,
                settings.last_notification_read_at
            ],
        )
        .with_context(|| format!("Failed to save settings for account {}", account_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_settings_for_unknown_account_returns_default() {
        let store = SqliteAccountSettingsStore::in_memory().unwrap();
        let settings = store.get_settings("nobody").unwrap();
        assert_eq!(settings, AccountSettings::default());
    }

    #[test]
    fn test_save_and_get_round_trip() {
        let store = SqliteAccountSettingsStore::in_memory().unwrap();

        let settings = AccountSettings {
            last_mention_read_at: Some("2024-03-01T10:00:00.000Z".to_string()),
            last_notification_read_at: Some("2024-03-02T08:30:00.000Z".to_string()),
        };
        store.save_settings("home", &settings).unwrap();

        assert_eq!(store.get_settings("home").unwrap(), settings);
    }

    #[test]
    fn test_save_overwrites_previous_value() {
        let store = SqliteAccountSettingsStore::in_memory().unwrap();

        let first = AccountSettings {
            last_mention_read_at: Some("2024-03-01T10:00:00.000Z".to_string()),
            last_notification_read_at: None,
        };
        store.save_settings("home", &first).unwrap();

        let second = AccountSettings {
            last_mention_read_at: Some("2024-03-05T12:00:00.000Z".to_string()),
            last_notification_read_at: Some("2024-03-04T09:00:00.000Z".to_string()),
        };
        store.save_settings("home", &second).unwrap();

        assert_eq!(store.get_settings("home").unwrap(), second);
    }

    #[test]
    fn test_accounts_are_isolated() {
        let store = SqliteAccountSettingsStore::in_memory().unwrap();

        let settings = AccountSettings {
            last_mention_read_at: Some("2024-03-01T10:00:00.000Z".to_string()),
            last_notification_read_at: None,
        };
        store.save_settings("home", &settings).unwrap();

        assert_eq!(store.get_settings("work").unwrap(), AccountSettings::default());
    }

    #[test]
    fn test_settings_survive_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("settings.db");

        let settings = AccountSettings {
            last_mention_read_at: Some("2024-03-01T10:00:00.000Z".to_string()),
            last_notification_read_at: None,
        };

        {
            let store = SqliteAccountSettingsStore::new(&db_path).unwrap();
            store.save_settings("home", &settings).unwrap();
        }

        let reopened = SqliteAccountSettingsStore::new(&db_path).unwrap();
        assert_eq!(reopened.get_settings("home").unwrap(), settings);
    }

    #[test]
    fn test_rejects_unsupported_db_version() {
        let dir = tempfile::TempDir::new().unwrap();
        let db_path = dir.path().join("settings.db");

        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute("PRAGMA user_version = 42", params![]).unwrap();
        }

        let result = SqliteAccountSettingsStore::new(&db_path);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Unsupported settings db version"));
    }
}
