//! Configuration loading and validation for the spread scanner.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides for credentials and deployment knobs.

mod duration;
mod error;
mod markets;
mod notification;
mod queue;
mod scanner;
mod storage;

pub use error::ConfigError;
pub use markets::{MarketsConfig, VenueConfig};
pub use notification::{NotificationConfig, TelegramConfig};
pub use queue::QueueConfig;
pub use scanner::ScannerConfig;
pub use storage::StorageConfig;

use rust_decimal::Decimal;
use serde::Deserialize;
use std::{env, fs, str::FromStr, time::Duration};

use crate::domain::RuntimeSettings;
use crate::pricing::normalize_pair_symbol;

/// Application-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Application name used in logs and reports.
    pub name: String,
    /// Deployment environment (development, staging, production).
    #[serde(default = "default_env")]
    pub env: String,
    /// Log level filter (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_env() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Root configuration structure for the spread scanner.
///
/// Only `app` is required; every other section falls back to defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub markets: MarketsConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    /// Pairs seeded into storage at startup (e.g., "BTC/USDT", "ethusdt").
    #[serde(default)]
    pub pairs: Vec<String>,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Loads `.env` first (if present), then applies overrides from
    /// the process environment:
    /// - `GATE_API_KEY`, `GATE_API_SECRET`, `KYBER_RPC_URL`, `USE_MOCK_MARKETS`
    /// - `QUEUE_URL`, `WORKER_CONCURRENCY`, `WORKER_JOB_TIMEOUT_MS`
    /// - `OPPORTUNITY_TTL_SECONDS`
    /// - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID`
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_string(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;

        config.apply_env(|key| env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from YAML without touching the environment.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply environment overrides using the given lookup.
    pub(crate) fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GATE_API_KEY") {
            self.markets.gate.api_key = key;
        }
        if let Some(secret) = non_empty("GATE_API_SECRET") {
            self.markets.gate.api_secret = secret;
        }
        if let Some(url) = non_empty("KYBER_RPC_URL") {
            self.markets.kyber.rpc_url = Some(url);
        }
        if let Some(flag) = non_empty("USE_MOCK_MARKETS") {
            self.markets.mock = !matches!(flag.trim().to_lowercase().as_str(), "false" | "0" | "no");
        }

        if let Some(url) = non_empty("QUEUE_URL") {
            self.queue.path = url;
        }
        if let Some(n) = non_empty("WORKER_CONCURRENCY").and_then(|v| v.trim().parse().ok()) {
            self.queue.concurrency = n;
        }
        if let Some(ms) = non_empty("WORKER_JOB_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
            self.queue.job_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = non_empty("OPPORTUNITY_TTL_SECONDS").and_then(|v| v.trim().parse().ok())
        {
            self.scanner.opportunity_ttl = Duration::from_secs(secs);
        }

        if let Some(ref mut telegram) = self.notification.telegram {
            if telegram.enabled {
                telegram.bot_token = lookup("TELEGRAM_BOT_TOKEN").unwrap_or_default();
                telegram.chat_id = lookup("TELEGRAM_CHAT_ID").unwrap_or_default();
            }
        }
    }

    /// Validate the configuration.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        if self.queue.concurrency == 0 {
            return Err(ConfigError::Validation(
                "queue.concurrency must be positive".into(),
            ));
        }
        if self.queue.job_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "queue.job_timeout must be positive".into(),
            ));
        }
        if self.queue.poll_interval.is_zero() {
            return Err(ConfigError::Validation(
                "queue.poll_interval must be positive".into(),
            ));
        }
        if self.queue.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "queue.retry.max_attempts must be at least 1".into(),
            ));
        }

        if self.scanner.opportunity_ttl.is_zero() {
            return Err(ConfigError::Validation(
                "scanner.opportunity_ttl must be positive".into(),
            ));
        }
        if self.scanner.opportunity_ttl.as_secs() > RuntimeSettings::MAX_OPPORTUNITY_TTL_SECONDS
        {
            return Err(ConfigError::Validation(
                "scanner.opportunity_ttl must not exceed one year".into(),
            ));
        }
        self.fee_rate()?;

        for pair in &self.pairs {
            normalize_pair_symbol(pair).map_err(|e| {
                ConfigError::Validation(format!("pairs: invalid symbol {:?}: {}", pair, e))
            })?;
        }

        if let Some(ref telegram) = self.notification.telegram {
            if telegram.enabled && (telegram.bot_token.is_empty() || telegram.chat_id.is_empty()) {
                return Err(ConfigError::Validation(
                    "notification.telegram: credentials not found (set TELEGRAM_BOT_TOKEN and TELEGRAM_CHAT_ID env vars)".into(),
                ));
            }
        }

        Ok(())
    }

    /// Per-leg taker fee as a decimal fraction. Zero when unset.
    pub fn fee_rate(&self) -> Result<Decimal, ConfigError> {
        let Some(ref raw) = self.scanner.fee_rate else {
            return Ok(Decimal::ZERO);
        };

        let rate = Decimal::from_str(raw.trim()).map_err(|e| {
            ConfigError::Validation(format!("scanner.fee_rate: invalid decimal {:?}: {}", raw, e))
        })?;

        if rate.is_sign_negative() || rate >= Decimal::ONE {
            return Err(ConfigError::Validation(
                "scanner.fee_rate must be in [0, 1)".into(),
            ));
        }

        Ok(rate)
    }

    pub fn is_production(&self) -> bool {
        self.app.env != "development"
    }
}
