//! Arbitrage opportunity domain model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// OpportunityStatus tracks the lifecycle of a recorded opportunity.
///
/// The detector creates records as `Active`, the TTL reaper moves open records
/// to `Expired`. `Executed` and `Failed` belong to the execution side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OpportunityStatus {
    Pending,
    Active,
    Executed,
    Failed,
    Expired,
}

impl OpportunityStatus {
    /// Statuses that are still open and therefore eligible for expiry.
    pub const OPEN: [OpportunityStatus; 2] = [OpportunityStatus::Pending, OpportunityStatus::Active];

    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunityStatus::Pending => "PENDING",
            OpportunityStatus::Active => "ACTIVE",
            OpportunityStatus::Executed => "EXECUTED",
            OpportunityStatus::Failed => "FAILED",
            OpportunityStatus::Expired => "EXPIRED",
        }
    }

    /// Returns true for statuses the reaper may still expire.
    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }
}

impl std::fmt::Display for OpportunityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OpportunityStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OpportunityStatus::Pending),
            "ACTIVE" => Ok(OpportunityStatus::Active),
            "EXECUTED" => Ok(OpportunityStatus::Executed),
            "FAILED" => Ok(OpportunityStatus::Failed),
            "EXPIRED" => Ok(OpportunityStatus::Expired),
            _ => Err(format!("Unknown opportunity status: {}", s)),
        }
    }
}

/// Opportunity is a recorded arbitrage window for one pair and one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Opportunity {
    pub id: i64,
    pub pair_id: i64,
    /// Venue where the base asset is bought.
    pub buy_exchange: String,
    /// Venue where the base asset is sold.
    pub sell_exchange: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    /// Spread as a percentage of the buy price.
    pub spread: Decimal,
    /// Expected gain in quote currency for `volume`.
    pub profit_estimate: Decimal,
    /// Notional trade size after clamping to the investment cap.
    pub volume: Decimal,
    pub status: OpportunityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once at creation, never earlier than `created_at`.
    pub expires_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl Opportunity {
    /// Returns true if the expiry time has passed.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Fields needed to record a new opportunity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOpportunity {
    pub pair_id: i64,
    pub buy_exchange: String,
    pub sell_exchange: String,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub spread: Decimal,
    pub profit_estimate: Decimal,
    pub volume: Decimal,
    pub status: OpportunityStatus,
    pub expires_at: DateTime<Utc>,
}

/// Row selector for bulk status transitions.
///
/// A row matches when its status is listed and, if any time bound is set,
/// at least one of the bounds holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusFilter {
    pub statuses: Vec<OpportunityStatus>,
    /// Matches rows with `expires_at <= bound`.
    pub expires_at_or_before: Option<DateTime<Utc>>,
    /// Matches rows with `updated_at < bound`.
    pub updated_before: Option<DateTime<Utc>>,
}
