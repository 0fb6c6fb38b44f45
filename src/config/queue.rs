//! Job queue and worker pool configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Queue backend and worker pool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// SQLite file backing the durable queue (env: QUEUE_URL).
    pub path: String,
    /// Number of concurrent workers (env: WORKER_CONCURRENCY).
    pub concurrency: usize,
    /// Hard limit for one job (env: WORKER_JOB_TIMEOUT_MS).
    #[serde(with = "duration")]
    pub job_timeout: Duration,
    /// How long an idle worker sleeps before polling again.
    #[serde(with = "duration")]
    pub poll_interval: Duration,
    /// How long completed and failed jobs are kept.
    #[serde(with = "duration")]
    pub retention: Duration,
    /// How often old jobs are pruned and the depth gauge refreshed.
    #[serde(with = "duration")]
    pub maintenance_interval: Duration,
    /// Retry behavior for failed jobs.
    pub retry: RetryConfig,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            path: "queue.db".to_string(),
            concurrency: 3,
            job_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
            retention: Duration::from_secs(24 * 3600),
            maintenance_interval: Duration::from_secs(5),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry settings for failed jobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further attempt.
    #[serde(with = "duration")]
    pub initial_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(3),
        }
    }
}
