//! Scan error types.

use std::time::Duration;

use crate::markets::AdapterError;
use crate::queue::QueueError;
use crate::storage::StorageError;

/// Job-level failure. The queue retries the job and dead-letters it once
/// attempts run out.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("job timed out after {0:?}")]
    Timeout(Duration),
    #[error("job aborted: {0}")]
    Panicked(String),
}

/// Failure of one pair inside a batch. Recorded in the job result, never
/// fails the job.
#[derive(Debug, thiserror::Error)]
pub enum PairScanError {
    #[error("{pair}: {source}")]
    Quote {
        pair: String,
        #[source]
        source: AdapterError,
    },
    #[error("{pair}: {source}")]
    Persist {
        pair: String,
        #[source]
        source: StorageError,
    },
}
