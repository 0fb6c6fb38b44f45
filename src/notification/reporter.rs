use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::error;

use crate::queue::DeadLetterEntry;

/// A job failure worth an operator's attention.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    /// Component that gave up (e.g., "scan-worker").
    pub component: String,
    pub job_id: String,
    pub queue: String,
    pub reason: String,
    pub attempts: u32,
    /// Original job payload as JSON.
    pub payload: Option<String>,
    pub failed_at: DateTime<Utc>,
}

impl FailureReport {
    pub fn from_dead_letter(component: &str, entry: &DeadLetterEntry) -> Self {
        Self {
            component: component.to_string(),
            job_id: entry.job_id.clone(),
            queue: entry.source_queue.to_string(),
            reason: entry.reason.clone(),
            attempts: entry.attempts,
            payload: serde_json::to_string(&entry.payload).ok(),
            failed_at: entry.failed_at,
        }
    }
}

/// ErrorReporter forwards job failures to an error-tracking channel.
#[async_trait::async_trait]
pub trait ErrorReporter: Send + Sync {
    /// Send the report and wait for delivery.
    async fn report(&self, report: &FailureReport) -> Result<(), NotificationError>;

    /// Queue the report without waiting.
    fn report_async(&self, report: FailureReport);

    /// Flush and release resources.
    async fn close(&self) -> Result<(), NotificationError>;
}

/// Notification delivery error.
#[derive(Debug, Clone)]
pub struct NotificationError {
    pub message: String,
}

impl fmt::Display for NotificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotificationError: {}", self.message)
    }
}

impl std::error::Error for NotificationError {}

impl NotificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// LogReporter writes failures to the error log. Always available.
#[derive(Debug, Default)]
pub struct LogReporter;

impl LogReporter {
    pub fn new() -> Self {
        Self
    }

    fn log(report: &FailureReport) {
        error!(
            component = %report.component,
            job_id = %report.job_id,
            queue = %report.queue,
            attempts = report.attempts,
            reason = %report.reason,
            payload = report.payload.as_deref().unwrap_or("-"),
            "Job failed permanently"
        );
    }
}

#[async_trait::async_trait]
impl ErrorReporter for LogReporter {
    async fn report(&self, report: &FailureReport) -> Result<(), NotificationError> {
        Self::log(report);
        Ok(())
    }

    fn report_async(&self, report: FailureReport) {
        Self::log(&report);
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

/// MultiReporter fans a report out to several reporters.
pub struct MultiReporter {
    reporters: Vec<Arc<dyn ErrorReporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Arc<dyn ErrorReporter>>) -> Self {
        Self { reporters }
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

#[async_trait::async_trait]
impl ErrorReporter for MultiReporter {
    async fn report(&self, report: &FailureReport) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for reporter in &self.reporters {
            if let Err(e) = reporter.report(report).await {
                errors.push(e.message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }

    fn report_async(&self, report: FailureReport) {
        for reporter in &self.reporters {
            reporter.report_async(report.clone());
        }
    }

    async fn close(&self) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for reporter in &self.reporters {
            if let Err(e) = reporter.close().await {
                errors.push(e.message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }
}

/// Formats a failure as a Telegram Markdown message.
pub fn format_failure(report: &FailureReport) -> String {
    let payload = report
        .payload
        .as_ref()
        .map(|p| format!("\nPayload: `{}`", p.replace('`', "'")))
        .unwrap_or_default();

    format!(
        "⚠️ *Scan job failed*\n\n\
         Component: {}\n\
         Job: `{}`\n\
         Queue: {}\n\
         Attempts: {}\n\
         Reason: {}{}\n\n\
         ⏰ {}",
        escape_markdown(&report.component),
        report.job_id,
        escape_markdown(&report.queue),
        report.attempts,
        escape_markdown(&report.reason),
        payload,
        report.failed_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Escapes characters that Telegram Markdown treats as formatting.
pub(crate) fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
