//! Opportunity detection configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Detection settings that are fixed for the lifetime of the process.
/// Operator-tunable values live in the settings table instead.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Opportunity lifetime used when the settings table has no
    /// `opportunity_expiry` row (env: OPPORTUNITY_TTL_SECONDS).
    #[serde(with = "duration")]
    pub opportunity_ttl: Duration,
    /// Taker fee per leg as a decimal string (e.g., "0.001" for 0.1%).
    pub fee_rate: Option<String>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            opportunity_ttl: Duration::from_secs(300),
            fee_rate: None,
        }
    }
}
