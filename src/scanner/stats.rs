//! Per-job scan statistics.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::domain::ScanStats;
use crate::storage::{ScanStore, StorageError};

/// Running min/max/mean of the prices fetched during one job.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceSummary {
    count: u32,
    sum: Decimal,
    min: Option<Decimal>,
    max: Option<Decimal>,
}

impl PriceSummary {
    pub fn add(&mut self, price: Decimal) {
        self.count += 1;
        self.sum += price;
        self.min = Some(self.min.map_or(price, |m| m.min(price)));
        self.max = Some(self.max.map_or(price, |m| m.max(price)));
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn min(&self) -> Option<Decimal> {
        self.min
    }

    pub fn max(&self) -> Option<Decimal> {
        self.max
    }

    /// Mean price rounded to 6 decimal places.
    pub fn average(&self) -> Option<Decimal> {
        if self.count == 0 {
            return None;
        }
        Some((self.sum / Decimal::from(self.count)).round_dp(6))
    }
}

/// Counters collected while a job scans its batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanTally {
    pub pair_id: Option<i64>,
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
    pub opportunities: u32,
    pub prices: PriceSummary,
    pub elapsed: Duration,
}

impl ScanTally {
    pub fn to_stats(&self) -> ScanStats {
        let elapsed_ms = i64::try_from(self.elapsed.as_millis()).unwrap_or(i64::MAX);

        ScanStats {
            pair_id: self.pair_id,
            total_scans: self.total,
            successful_scans: self.successful,
            failed_scans: self.failed,
            opportunities_found: self.opportunities,
            average_scan_time: Decimal::new(elapsed_ms, 3).round_dp(2),
            min_price: self.prices.min(),
            max_price: self.prices.max(),
            avg_price: self.prices.average(),
            last_scan_at: Utc::now(),
        }
    }
}

/// StatsRecorder appends one statistics row per executed job.
pub struct StatsRecorder {
    store: Arc<dyn ScanStore>,
}

impl StatsRecorder {
    pub fn new(store: Arc<dyn ScanStore>) -> Self {
        Self { store }
    }

    pub async fn record(&self, tally: &ScanTally) -> Result<ScanStats, StorageError> {
        let stats = tally.to_stats();
        self.store.create_scan_stats(&stats).await?;

        debug!(
            pair_id = ?stats.pair_id,
            total = stats.total_scans,
            failed = stats.failed_scans,
            seconds = %stats.average_scan_time,
            "Scan stats recorded"
        );

        Ok(stats)
    }
}
