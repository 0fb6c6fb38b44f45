mod config;
mod domain;
mod markets;
mod notification;
mod pricing;
mod queue;
mod scanner;
mod storage;

use std::env;
use std::sync::Arc;

use tracing::{Level, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use config::{Config, ConfigError};
use markets::{AdapterError, Venues};
use notification::{ErrorReporter, LogReporter, MultiReporter, NotificationError, TelegramReporter};
use queue::{JobQueue, QueueError};
use scanner::{PoolOptions, ScanContext, ScanOptions, SettingsProvider, WorkerPool};
use storage::{ScanStore, SqliteStorage, SqliteStorageConfig, StorageError};

const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

/// Failures that prevent the scanner from starting.
#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("market error: {0}")]
    Markets(#[from] AdapterError),
    #[error("notification error: {0}")]
    Notification(#[from] NotificationError),
    #[error("signal error: {0}")]
    Signal(#[from] std::io::Error),
}

fn parse_config_path() -> String {
    for arg in env::args().skip(1) {
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

fn init_tracing(log_level: &str) {
    let level = match log_level {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() {
    let config_path = parse_config_path();

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    init_tracing(&config.app.log_level);
    info!(config = %config_path, name = %config.app.name, env = %config.app.env, "Config loaded");

    if let Err(e) = run(config).await {
        error!(error = %e, "Scanner stopped with error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), StartupError> {
    let storage = SqliteStorage::new(SqliteStorageConfig::from(&config.storage)).await?;
    for symbol in &config.pairs {
        match storage.ensure_pair(symbol).await {
            Ok(pair) => info!(pair = %pair.symbol, id = pair.id, active = pair.is_active, "Pair registered"),
            Err(e) => warn!(pair = %symbol, error = %e, "Failed to register pair"),
        }
    }
    let store: Arc<dyn ScanStore> = Arc::new(storage);

    let queue = Arc::new(JobQueue::open(&config.queue).await?);
    let recovered = queue.recover_stalled(config.queue.job_timeout).await?;
    if recovered > 0 {
        warn!(recovered, "Requeued jobs left active by a previous run");
    }

    let venues = Venues::from_config(&config.markets)?;
    venues.connect_all().await?;
    info!(
        venues = ?venues.status(),
        primary_mock = venues.primary().is_mock(),
        secondary_mock = venues.secondary().is_mock(),
        "Market adapters connected"
    );

    let reporter = build_reporter(&config)?;
    let options = ScanOptions::from_config(&config)?;

    let settings = SettingsProvider::new(store.clone(), options.default_ttl_seconds)
        .load()
        .await;
    queue.ensure_scheduled(settings.scan_interval_seconds).await?;

    let ctx = Arc::new(ScanContext::new(store, queue, venues, reporter, options));
    let pool = WorkerPool::start(ctx.clone(), PoolOptions::from(&config.queue));

    info!("Scanner running (press Ctrl+C to stop)");
    let signal = tokio::signal::ctrl_c().await;
    if signal.is_ok() {
        info!("Shutdown signal received");
    }

    pool.shutdown().await;
    ctx.close().await;

    signal?;
    Ok(())
}

/// The log reporter, plus Telegram when enabled.
fn build_reporter(config: &Config) -> Result<Arc<dyn ErrorReporter>, StartupError> {
    let mut reporters: Vec<Arc<dyn ErrorReporter>> = vec![Arc::new(LogReporter::new())];

    if let Some(ref telegram) = config.notification.telegram {
        if let Some(reporter) = TelegramReporter::from_config(telegram)? {
            info!("Telegram error reporter enabled");
            reporters.push(Arc::new(reporter));
        }
    }

    Ok(Arc::new(MultiReporter::new(reporters)))
}
