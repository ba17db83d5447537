use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod account;
use account::SqliteAccountSettingsStore;

mod config;
use config::{AppConfig, CliConfig, FileConfig};

mod notifications;
use notifications::{
    CatchUpFetcher, LiveUpdateBridge, NewUnreadAlerter, NotificationAggregator,
    NotificationSyncManager, TerminalBellAlert,
};

mod transport;
use transport::{LoggingErrorSink, MastodonGateway, MastodonLiveSource};

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to the TOML configuration file (accounts live here).
    pub config: PathBuf,

    /// Path to the SQLite file holding per-account read state.
    #[clap(long)]
    pub db_path: Option<PathBuf>,

    /// Notifications fetched per class during catch-up.
    #[clap(long, default_value_t = 10)]
    pub page_size: usize,

    /// Timeout in seconds for REST requests.
    #[clap(long, default_value_t = 30)]
    pub request_timeout_sec: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = FileConfig::load(&cli_args.config)
        .with_context(|| format!("Loading config from {:?}", cli_args.config))?;

    let cli_config = CliConfig {
        db_path: cli_args.db_path,
        page_size: cli_args.page_size,
        request_timeout_sec: cli_args.request_timeout_sec,
    };
    let config = AppConfig::resolve(&cli_config, Some(file_config))?;

    if config.accounts.is_empty() {
        info!("No accounts configured, nothing to watch");
        return Ok(());
    }

    info!("Opening settings database at {:?}...", config.db_path);
    let settings_store = Arc::new(SqliteAccountSettingsStore::new(&config.db_path)?);

    let aggregator = Arc::new(NotificationAggregator::new(settings_store));
    let gateway = Arc::new(MastodonGateway::new(config.request_timeout_sec));
    let live_source = Arc::new(MastodonLiveSource::new(
        gateway.clone(),
        config.live_stream.clone(),
    ));
    let error_sink = Arc::new(LoggingErrorSink);

    let fetcher = CatchUpFetcher::new(
        gateway,
        aggregator.clone(),
        error_sink.clone(),
        config.page_size,
    );
    let bridge = Arc::new(LiveUpdateBridge::new(live_source, aggregator.clone()));
    let manager = NotificationSyncManager::new(fetcher, bridge, aggregator.clone(), error_sink);

    if config.alerts.enabled {
        let alerter = Arc::new(NewUnreadAlerter::new(
            Arc::new(TerminalBellAlert),
            config.alerts.min_interval,
        ));
        alerter.spawn(aggregator.subscribe_transitions());
    }

    // Log a per-account unread summary on every published snapshot.
    let mut snapshots = aggregator.subscribe();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            for state in &snapshot {
                info!(
                    "{}: {} mentions ({}), {} notifications ({})",
                    state.account.id,
                    state.mentions.len(),
                    if state.has_new_mentions { "unread" } else { "read" },
                    state.notifications.len(),
                    if state.has_new_notifications { "unread" } else { "read" },
                );
            }
        }
    });

    info!("Watching {} accounts", config.accounts.len());
    manager.start_all(config.accounts.clone()).await;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    manager.shutdown();

    Ok(())
}
