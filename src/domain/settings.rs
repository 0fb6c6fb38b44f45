//! Runtime trading parameters.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Keys read from the settings table in one batch.
pub const SETTING_KEYS: [&str; 5] = [
    RuntimeSettings::MIN_SPREAD_KEY,
    RuntimeSettings::MAX_INVESTMENT_KEY,
    RuntimeSettings::SCAN_INTERVAL_KEY,
    RuntimeSettings::OPPORTUNITY_EXPIRY_KEY,
    RuntimeSettings::MAX_CONCURRENT_SCANS_KEY,
];

/// RuntimeSettings are the knobs an operator can change without a restart.
/// They are read fresh for every scan job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSettings {
    /// Minimum spread percentage that makes a direction worth recording.
    pub min_spread: Decimal,
    /// Cap on the notional size of one opportunity, in quote currency.
    pub max_investment: Decimal,
    pub scan_interval_seconds: u64,
    pub opportunity_ttl_seconds: u64,
    /// Batch size for scans that do not target a single pair.
    pub max_concurrent_scans: u32,
}

impl RuntimeSettings {
    pub const MIN_SPREAD_KEY: &'static str = "min_spread";
    pub const MAX_INVESTMENT_KEY: &'static str = "max_investment";
    pub const SCAN_INTERVAL_KEY: &'static str = "scan_interval";
    pub const OPPORTUNITY_EXPIRY_KEY: &'static str = "opportunity_expiry";
    pub const MAX_CONCURRENT_SCANS_KEY: &'static str = "max_concurrent_scans";

    pub const DEFAULT_SCAN_INTERVAL_SECONDS: u64 = 60;
    pub const DEFAULT_OPPORTUNITY_TTL_SECONDS: u64 = 300;
    pub const DEFAULT_MAX_CONCURRENT_SCANS: u32 = 5;

    /// Longest accepted opportunity TTL: one year.
    pub const MAX_OPPORTUNITY_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

    /// Default minimum spread: 1.5%.
    pub fn default_min_spread() -> Decimal {
        Decimal::new(15, 1)
    }

    /// Default investment cap: 10000.
    pub fn default_max_investment() -> Decimal {
        Decimal::new(10_000, 0)
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            min_spread: Self::default_min_spread(),
            max_investment: Self::default_max_investment(),
            scan_interval_seconds: Self::DEFAULT_SCAN_INTERVAL_SECONDS,
            opportunity_ttl_seconds: Self::DEFAULT_OPPORTUNITY_TTL_SECONDS,
            max_concurrent_scans: Self::DEFAULT_MAX_CONCURRENT_SCANS,
        }
    }
}
