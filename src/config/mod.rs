mod file_config;

pub use file_config::{AccountEntry, AlertsConfig, FileConfig, LiveStreamConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

use crate::account::Account;
use crate::transport::ReconnectPolicy;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub page_size: usize,
    pub request_timeout_sec: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_path: PathBuf,
    pub page_size: usize,
    pub request_timeout_sec: u64,

    // Feature configs (with defaults)
    pub alerts: AlertsSettings,
    pub live_stream: ReconnectPolicy,

    pub accounts: Vec<Account>,
}

#[derive(Debug, Clone)]
pub struct AlertsSettings {
    pub enabled: bool,
    pub min_interval: Duration,
}

impl Default for AlertsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval: Duration::from_secs(60),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db-path or in config file")
            })?;

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                bail!("Settings database directory does not exist: {:?}", parent);
            }
        }

        let page_size = file.page_size.unwrap_or(cli.page_size);
        if page_size == 0 {
            bail!("page_size must be greater than zero");
        }

        let request_timeout_sec = file.request_timeout_sec.unwrap_or(cli.request_timeout_sec);

        // Alert settings - merge file config with defaults
        let alerts_file = file.alerts.unwrap_or_default();
        let alerts = AlertsSettings {
            enabled: alerts_file.enabled.unwrap_or(true),
            min_interval: Duration::from_secs(alerts_file.min_interval_secs.unwrap_or(60)),
        };

        // Live stream reconnect settings
        let live_file = file.live_stream.unwrap_or_default();
        let defaults = ReconnectPolicy::default();
        let live_stream = ReconnectPolicy {
            initial_backoff_secs: live_file
                .initial_backoff_secs
                .unwrap_or(defaults.initial_backoff_secs),
            max_backoff_secs: live_file.max_backoff_secs.unwrap_or(defaults.max_backoff_secs),
            backoff_multiplier: live_file
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
        };

        let accounts = resolve_accounts(file.accounts)?;

        Ok(Self {
            db_path,
            page_size,
            request_timeout_sec,
            alerts,
            live_stream,
            accounts,
        })
    }
}

fn resolve_accounts(entries: Vec<AccountEntry>) -> Result<Vec<Account>> {
    let mut accounts: Vec<Account> = Vec::with_capacity(entries.len());
    for entry in entries {
        if entry.name.is_empty() {
            bail!("Account name must not be empty");
        }
        if entry.instance.is_empty() {
            bail!("Account {} has an empty instance", entry.name);
        }
        if entry.access_token.is_empty() {
            bail!("Account {} has an empty access token", entry.name);
        }
        if accounts.iter().any(|a| a.id == entry.name) {
            bail!("Duplicate account name: {}", entry.name);
        }
        accounts.push(Account::new(entry.name, entry.instance, entry.access_token));
    }
    Ok(accounts)
}
