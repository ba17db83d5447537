use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_path: Option<String>,
    pub page_size: Option<usize>,
    pub request_timeout_sec: Option<u64>,

    // Feature configs
    pub alerts: Option<AlertsConfig>,
    pub live_stream: Option<LiveStreamConfig>,

    /// Watched accounts.
    pub accounts: Vec<AccountEntry>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AlertsConfig {
    pub enabled: Option<bool>,
    pub min_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LiveStreamConfig {
    pub initial_backoff_secs: Option<u64>,
    pub max_backoff_secs: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccountEntry {
    /// Local name identifying the account, e.g. "home".
    pub name: String,
    /// Instance host, e.g. "mastodon.social".
    pub instance: String,
    /// Bearer token for the account.
    pub access_token: String,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
