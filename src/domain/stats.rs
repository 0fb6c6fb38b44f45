//! Aggregate statistics for one scan pass.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// ScanStats summarizes one executed scan job. Rows are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    /// Pair the job was scoped to, None for batch scans.
    pub pair_id: Option<i64>,
    pub total_scans: u32,
    pub successful_scans: u32,
    pub failed_scans: u32,
    pub opportunities_found: u32,
    /// Wall time of the pass in seconds.
    pub average_scan_time: Decimal,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub avg_price: Option<Decimal>,
    pub last_scan_at: DateTime<Utc>,
}
