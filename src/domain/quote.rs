//! Market quote snapshot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Quote is the latest price and traded volume seen on one venue.
/// It lives only for the duration of a scan and is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Creates a quote stamped with the current time.
    pub fn new(price: Decimal, volume: Decimal) -> Self {
        Self {
            price,
            volume,
            timestamp: Utc::now(),
        }
    }
}
