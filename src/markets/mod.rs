//! Market data adapters for the two scanned venues.

mod base;
mod gate;
mod kyber;
mod limiter;
mod mock;
mod utils;
mod venues;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::pricing::SymbolError;

pub use gate::GateIoAdapter;
pub use kyber::KyberAdapter;
pub use limiter::RateLimiter;
pub use mock::{MockQuotes, PriceModel};
pub use venues::Venues;

/// Adapter errors.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// A quote was requested before `connect()`.
    #[error("adapter {0} is not connected")]
    NotConnected(String),

    /// The pair symbol could not be normalized.
    #[error(transparent)]
    Symbol(#[from] SymbolError),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Non-success response from the venue.
    #[error("API error: {0}")]
    Api(String),

    /// The venue returned no ticker for the pair.
    #[error("ticker for {0} not found")]
    TickerNotFound(String),

    /// A numeric field could not be parsed as a decimal.
    #[error("invalid number: {0}")]
    InvalidNumber(String),
}

/// Result type for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;

/// MarketDataAdapter fetches current quotes for one venue.
///
/// Live-mode request failures never surface to callers: the adapter logs
/// and answers with a mock quote instead. Only calls made before `connect()`
/// or with an unusable symbol return an error.
#[async_trait]
pub trait MarketDataAdapter: Send + Sync {
    /// Connect prepares the adapter for quoting. An adapter without
    /// credentials or endpoint switches to mock mode for its lifetime.
    async fn connect(&self) -> Result<()>;

    /// Disconnect stops quoting. Safe to call multiple times.
    async fn disconnect(&self) -> Result<()>;

    /// Last traded price for the pair.
    async fn get_price(&self, pair: &str) -> Result<Decimal>;

    /// Quote-asset volume for the pair.
    async fn get_volume(&self, pair: &str) -> Result<Decimal>;

    fn is_connected(&self) -> bool;

    /// True when quotes are synthetic.
    fn is_mock(&self) -> bool;

    /// Venue label stored on opportunities (e.g., "Gate.io").
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests;
