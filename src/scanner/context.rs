//! Shared collaborators of the scan pipeline.

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{Config, ConfigError};
use crate::markets::Venues;
use crate::notification::ErrorReporter;
use crate::queue::JobQueue;
use crate::storage::ScanStore;

/// Process-wide scan parameters that never change at runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    /// Opportunity lifetime used when the settings table has none.
    pub default_ttl_seconds: u64,
    /// Taker fee per leg, as a fraction.
    pub fee_rate: Decimal,
    /// Pairs scanned concurrently inside one job.
    pub pair_parallelism: usize,
}

impl ScanOptions {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            default_ttl_seconds: config.scanner.opportunity_ttl.as_secs(),
            fee_rate: config.fee_rate()?,
            pair_parallelism: config.queue.concurrency.max(1),
        })
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 300,
            fee_rate: Decimal::ZERO,
            pair_parallelism: 3,
        }
    }
}

/// ScanContext owns every client a scan job talks to.
pub struct ScanContext {
    pub store: Arc<dyn ScanStore>,
    pub queue: Arc<JobQueue>,
    pub venues: Venues,
    pub reporter: Arc<dyn ErrorReporter>,
    pub options: ScanOptions,
}

impl ScanContext {
    pub fn new(
        store: Arc<dyn ScanStore>,
        queue: Arc<JobQueue>,
        venues: Venues,
        reporter: Arc<dyn ErrorReporter>,
        options: ScanOptions,
    ) -> Self {
        Self {
            store,
            queue,
            venues,
            reporter,
            options,
        }
    }

    /// Disconnects the venues and closes queue, store and reporter.
    pub async fn close(&self) {
        self.venues.disconnect_all().await;
        self.queue.close().await;

        if let Err(e) = self.store.close().await {
            warn!(error = %e, "Failed to close store");
        }
        if let Err(e) = self.reporter.close().await {
            warn!(error = %e, "Failed to close error reporter");
        }

        info!("Scan context closed");
    }
}
