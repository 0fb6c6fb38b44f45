//! Queue records and their state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::{JobStatus, ScanJobPayload, ScanJobResult};

/// The three queues used by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueueName {
    #[serde(rename = "scan.manual")]
    Manual,
    #[serde(rename = "scan.scheduled")]
    Scheduled,
    #[serde(rename = "scan.dead-letter")]
    DeadLetter,
}

impl QueueName {
    /// Queues workers claim from, in priority order.
    pub const WORK: [QueueName; 2] = [QueueName::Manual, QueueName::Scheduled];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Manual => "scan.manual",
            QueueName::Scheduled => "scan.scheduled",
            QueueName::DeadLetter => "scan.dead-letter",
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scan.manual" => Ok(QueueName::Manual),
            "scan.scheduled" => Ok(QueueName::Scheduled),
            "scan.dead-letter" => Ok(QueueName::DeadLetter),
            _ => Err(format!("Unknown queue: {}", s)),
        }
    }
}

/// Internal job state.
///
/// `waiting -> active -> completed`, or `active -> delayed -> active` while
/// attempts remain, or `active -> failed` once they run out. Waiting and
/// delayed jobs can also be cancelled straight to `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Delayed => "delayed",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// Externally visible status for this state.
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Waiting | JobState::Delayed => JobStatus::Queued,
            JobState::Active => JobStatus::Processing,
            JobState::Completed => JobStatus::Completed,
            JobState::Failed => JobStatus::Failed,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::str::FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "delayed" => Ok(JobState::Delayed),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            _ => Err(format!("Unknown job state: {}", s)),
        }
    }
}

/// Attempts and backoff applied to every enqueued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each further attempt.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    /// Delay after the given failed attempt (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.initial_backoff.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(3),
        }
    }
}

/// A job as stored in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedJob {
    pub id: String,
    pub queue: QueueName,
    pub payload: ScanJobPayload,
    pub state: JobState,
    /// Attempts started so far.
    pub attempts: u32,
    pub max_attempts: u32,
    /// Earliest time the job may be claimed.
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<ScanJobResult>,
    pub failed_reason: Option<String>,
}

/// What happened to a job after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FailOutcome {
    /// The job goes back to the queue after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Attempts are exhausted; the job was copied to the dead-letter queue.
    DeadLettered(DeadLetterEntry),
}

/// A job that ran out of attempts, with its original payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterEntry {
    pub job_id: String,
    pub payload: ScanJobPayload,
    pub failed_at: DateTime<Utc>,
    pub reason: String,
    pub attempts: u32,
    pub source_queue: QueueName,
}

/// Job counts per state across the work queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    pub waiting: u64,
    pub delayed: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueDepth {
    /// Jobs not yet finished: waiting + delayed + active.
    pub fn pending(&self) -> u64 {
        self.waiting + self.delayed + self.active
    }
}
