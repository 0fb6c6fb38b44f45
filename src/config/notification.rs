//! Failure reporting configuration.

use serde::Deserialize;

/// Where dead-lettered job failures are reported besides the log.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    /// Telegram bot reports (optional).
    pub telegram: Option<TelegramConfig>,
}

/// Telegram report settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Bot token (loaded from TELEGRAM_BOT_TOKEN env var).
    #[serde(skip)]
    pub bot_token: String,
    /// Target chat ID (loaded from TELEGRAM_CHAT_ID env var).
    #[serde(skip)]
    pub chat_id: String,
}
