use std::time::Duration;
use tokio::sync::mpsc;
use tracing::error;

use crate::config::TelegramConfig;
use crate::notification::{ErrorReporter, FailureReport, NotificationError, format_failure};

const TELEGRAM_API_URL: &str = "https://api.telegram.org/bot";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_MESSAGE_LENGTH: usize = 4096;
const ASYNC_QUEUE_SIZE: usize = 100;

/// Sends failure reports to a Telegram chat through the Bot API.
pub struct TelegramReporter {
    chat_id: String,
    http_client: reqwest::Client,
    api_url: String,
    sender: mpsc::Sender<FailureReport>,
}

impl TelegramReporter {
    pub fn new(
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Result<Self, NotificationError> {
        Self::with_api_base(TELEGRAM_API_URL, bot_token, chat_id)
    }

    /// Builds a reporter from config, or None when Telegram is disabled.
    pub fn from_config(config: &TelegramConfig) -> Result<Option<Self>, NotificationError> {
        if !config.enabled {
            return Ok(None);
        }
        Self::new(config.bot_token.clone(), config.chat_id.clone()).map(Some)
    }

    fn with_api_base(
        api_base: &str,
        bot_token: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Result<Self, NotificationError> {
        let bot_token = bot_token.into();
        let chat_id = chat_id.into();

        if bot_token.is_empty() {
            return Err(NotificationError::new("bot_token is required"));
        }
        if chat_id.is_empty() {
            return Err(NotificationError::new("chat_id is required"));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::new(format!("Failed to create HTTP client: {}", e)))?;

        let api_url = format!("{}{}", api_base, bot_token);

        let (sender, receiver) = mpsc::channel(ASYNC_QUEUE_SIZE);
        Self::spawn_worker(receiver, http_client.clone(), api_url.clone(), chat_id.clone());

        Ok(Self {
            chat_id,
            http_client,
            api_url,
            sender,
        })
    }

    fn spawn_worker(
        mut receiver: mpsc::Receiver<FailureReport>,
        http_client: reqwest::Client,
        api_url: String,
        chat_id: String,
    ) {
        tokio::spawn(async move {
            while let Some(report) = receiver.recv().await {
                let text = format_failure(&report);
                if let Err(e) = send_message(&http_client, &api_url, &chat_id, &text).await {
                    error!(error = %e, job_id = %report.job_id, "Failed to send Telegram report");
                }
            }
        });
    }
}

/// Cuts a message to Telegram's length limit on a character boundary.
pub(crate) fn truncate_message(text: &str) -> &str {
    match text.char_indices().nth(MAX_MESSAGE_LENGTH) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

async fn send_message(
    http_client: &reqwest::Client,
    api_url: &str,
    chat_id: &str,
    text: &str,
) -> Result<(), NotificationError> {
    let url = format!("{}/sendMessage", api_url);

    let payload = serde_json::json!({
        "chat_id": chat_id,
        "text": truncate_message(text),
        "parse_mode": "Markdown"
    });

    let response = http_client
        .post(&url)
        .json(&payload)
        .send()
        .await
        .map_err(|e| NotificationError::new(format!("HTTP request failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(NotificationError::new(format!(
            "Telegram API error: {} - {}",
            status, body
        )));
    }

    Ok(())
}

#[async_trait::async_trait]
impl ErrorReporter for TelegramReporter {
    async fn report(&self, report: &FailureReport) -> Result<(), NotificationError> {
        let text = format_failure(report);
        send_message(&self.http_client, &self.api_url, &self.chat_id, &text).await
    }

    fn report_async(&self, report: FailureReport) {
        if let Err(e) = self.sender.try_send(report) {
            error!(error = %e, "Failed to queue Telegram report");
        }
    }

    async fn close(&self) -> Result<(), NotificationError> {
        // Give the worker a moment to drain queued reports.
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}
