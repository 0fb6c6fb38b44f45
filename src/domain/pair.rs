//! Trading pair model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pair is a market watched on both venues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pair {
    pub id: i64,
    /// Normalized symbol in "BASE/QUOTE" format (e.g., "MANA/USDT").
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    /// Inactive pairs are never picked for a scan batch.
    pub is_active: bool,
    /// Bumped whenever an opportunity is recorded for the pair.
    pub updated_at: DateTime<Utc>,
}
