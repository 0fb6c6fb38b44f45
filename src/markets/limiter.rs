//! Outbound request spacing for a single venue.

use std::future::Future;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{self, Instant};

/// Default spacing between two requests to the same venue.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(200);

/// RateLimiter runs at most one task at a time and starts tasks at least
/// `min_interval` apart. Waiters are served in FIFO order.
pub struct RateLimiter {
    min_interval: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_start: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Waits for a free slot, then runs the task to completion.
    pub async fn schedule<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        // The guard is held across the task so only one request is in flight.
        let mut last_start = self.last_start.lock().await;

        if let Some(previous) = *last_start {
            time::sleep_until(previous + self.min_interval).await;
        }
        *last_start = Some(Instant::now());

        task.await
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL)
    }
}
