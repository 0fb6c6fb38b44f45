//! Durable scan job queue backed by SQLite.
//!
//! Manual and scheduled scans live in separate queues so workers can favor
//! operator requests. Jobs that exhaust their attempts are copied into the
//! dead-letter table together with the failure reason.

mod sqlite;
mod types;

pub use sqlite::JobQueue;
pub use types::{DeadLetterEntry, FailOutcome, JobState, QueueName, QueuedJob, RetryPolicy};

use thiserror::Error;

use crate::domain::ValidationError;

/// Identity of the single recurring scan registration.
pub const SCHEDULED_JOB_KEY: &str = "scheduled-scan-job";

/// Shortest interval accepted for the recurring scan.
pub const MIN_SCHEDULE_INTERVAL_SECONDS: u64 = 15;

/// Estimate reported to callers enqueueing a manual scan, in seconds.
pub const ESTIMATED_SCAN_SECONDS: u64 = 30;

/// Reason stored on jobs cancelled before they were claimed.
pub const CANCELLED_REASON: &str = "cancelled";

/// Queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The job does not exist or is not in the state the operation needs.
    #[error("job {id} is not {expected}")]
    InvalidState { id: String, expected: &'static str },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
