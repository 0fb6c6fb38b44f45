//! Spread detection for one pair across the two venues.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::domain::{NewOpportunity, Opportunity, OpportunityStatus, Pair, RuntimeSettings};
use crate::pricing::{apply_fee, calculate_potential_gain, calculate_spread, clamp_trade_size};
use crate::storage::{ScanStore, StorageError};

/// Price and volume fetched from one venue during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct VenueQuote {
    pub venue: String,
    pub price: Decimal,
    pub volume: Decimal,
}

impl VenueQuote {
    pub fn new(venue: impl Into<String>, price: Decimal, volume: Decimal) -> Self {
        Self {
            venue: venue.into(),
            price,
            volume,
        }
    }
}

/// OpportunityDetector records every direction whose spread clears the
/// configured minimum.
pub struct OpportunityDetector {
    store: Arc<dyn ScanStore>,
    fee_rate: Decimal,
}

impl OpportunityDetector {
    pub fn new(store: Arc<dyn ScanStore>, fee_rate: Decimal) -> Self {
        Self { store, fee_rate }
    }

    /// Evaluates buying on `buy` and selling on `sell`.
    pub async fn evaluate_direction(
        &self,
        pair: &Pair,
        buy: &VenueQuote,
        sell: &VenueQuote,
        settings: &RuntimeSettings,
    ) -> Result<Option<Opportunity>, StorageError> {
        let spread = calculate_spread(buy.price, sell.price);
        if spread < settings.min_spread {
            return Ok(None);
        }

        let volume = clamp_trade_size(settings.max_investment, buy.volume.min(sell.volume));
        let gain = calculate_potential_gain(spread, volume);
        let profit_estimate = apply_fee(gain, volume, self.fee_rate);

        let opportunity = self
            .store
            .create_opportunity(&NewOpportunity {
                pair_id: pair.id,
                buy_exchange: buy.venue.clone(),
                sell_exchange: sell.venue.clone(),
                buy_price: buy.price,
                sell_price: sell.price,
                spread,
                profit_estimate,
                volume,
                status: OpportunityStatus::Active,
                expires_at: expiry_after(Utc::now(), settings.opportunity_ttl_seconds),
            })
            .await?;

        info!(
            pair = %pair.symbol,
            buy = %buy.venue,
            sell = %sell.venue,
            spread = %spread.round_dp(4),
            profit = %profit_estimate.round_dp(2),
            "Opportunity recorded"
        );

        Ok(Some(opportunity))
    }

    /// Evaluates both directions concurrently. Returns 0, 1 or 2 records.
    pub async fn evaluate_pair(
        &self,
        pair: &Pair,
        a: &VenueQuote,
        b: &VenueQuote,
        settings: &RuntimeSettings,
    ) -> Result<Vec<Opportunity>, StorageError> {
        let (forward, reverse) = tokio::try_join!(
            self.evaluate_direction(pair, a, b, settings),
            self.evaluate_direction(pair, b, a, settings),
        )?;

        Ok(forward.into_iter().chain(reverse).collect())
    }
}

/// 9999-12-31T23:59:59Z, the last instant with a four-digit year. Stored
/// timestamps compare as text, so later ones would sort wrongly.
const LATEST_EXPIRY_SECS: i64 = 253_402_300_799;

fn expiry_after(now: DateTime<Utc>, ttl_seconds: u64) -> DateTime<Utc> {
    let latest = DateTime::<Utc>::from_timestamp(LATEST_EXPIRY_SECS, 0).unwrap_or(now);

    i64::try_from(ttl_seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .map_or(latest, |at| at.min(latest))
}
