//! Gate.io spot market adapter.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::base::AdapterCore;
use super::limiter::RateLimiter;
use super::mock::{MockQuotes, PriceModel};
use super::utils::{pair_to_symbol, parse_decimal};
use super::{AdapterError, MarketDataAdapter, Result};
use crate::config::VenueConfig;
use crate::domain::Quote;

/// Venue label stored on opportunities.
pub const GATE_NAME: &str = "Gate.io";

/// Production Gate.io REST endpoint.
const DEFAULT_BASE_URL: &str = "https://api.gateio.ws/api/v4";

const DEFAULT_MOCK_SEED: u64 = 0x6A7E_10;

#[derive(Debug, Deserialize)]
struct SpotTicker {
    last: String,
    #[serde(default)]
    quote_volume: Option<String>,
    #[serde(default)]
    base_volume: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServerTime {
    server_time: i64,
}

/// Gate.io spot ticker adapter.
///
/// Runs in mock mode when forced by configuration or when API credentials
/// are missing at connect time.
pub struct GateIoAdapter {
    core: AdapterCore,
    http: HttpClient,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl GateIoAdapter {
    pub fn new(config: &VenueConfig, force_mock: bool) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()?;

        let mock_quotes = MockQuotes::new(
            PriceModel::Orderbook,
            config.mock_seed.unwrap_or(DEFAULT_MOCK_SEED),
        );

        Ok(Self {
            core: AdapterCore::new(
                GATE_NAME,
                force_mock,
                RateLimiter::new(config.min_request_interval),
                mock_quotes,
            ),
            http,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    /// Fetches the spot ticker for a normalized pair.
    async fn fetch_ticker(&self, pair: String) -> Result<Quote> {
        let url = format!("{}/spot/tickers", self.base_url);
        let currency_pair = pair_to_symbol(&pair, '_');

        debug!(adapter = GATE_NAME, pair = %currency_pair, "Fetching ticker");

        let response = self
            .http
            .get(&url)
            .query(&[("currency_pair", currency_pair.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(AdapterError::Api(format!(
                "{}: {}",
                status,
                String::from_utf8_lossy(&body)
            )));
        }

        let tickers: Vec<SpotTicker> = serde_json::from_slice(&body)?;
        let ticker = tickers
            .into_iter()
            .next()
            .ok_or(AdapterError::TickerNotFound(pair))?;

        let price = parse_decimal(&ticker.last)?;
        let volume = match ticker.quote_volume.or(ticker.base_volume) {
            Some(raw) => parse_decimal(&raw)?,
            None => Decimal::ZERO,
        };

        Ok(Quote::new(price, volume))
    }

    /// Fetches the venue clock in milliseconds.
    async fn server_time(&self) -> Result<i64> {
        let url = format!("{}/spot/time", self.base_url);
        let response = self.http.get(&url).send().await?;
        let time: ServerTime = serde_json::from_slice(&response.bytes().await?)?;
        Ok(time.server_time)
    }
}

#[async_trait]
impl MarketDataAdapter for GateIoAdapter {
    async fn connect(&self) -> Result<()> {
        if !self.core.is_mock() && (self.api_key.is_empty() || self.api_secret.is_empty()) {
            warn!(
                adapter = GATE_NAME,
                "Missing API credentials, entering mock mode"
            );
            self.core.enter_mock();
        }

        if !self.core.is_mock() {
            match self.server_time().await {
                Ok(server_ms) => {
                    let drift_ms = chrono::Utc::now().timestamp_millis() - server_ms;
                    debug!(adapter = GATE_NAME, drift_ms, "Venue clock checked");
                }
                Err(e) => {
                    warn!(adapter = GATE_NAME, error = %e, "Venue clock check failed");
                }
            }
        }

        self.core.set_connected(true);
        info!(adapter = GATE_NAME, mock = self.core.is_mock(), "Adapter connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.core.set_connected(false);
        info!(adapter = GATE_NAME, "Adapter disconnected");
        Ok(())
    }

    async fn get_price(&self, pair: &str) -> Result<Decimal> {
        let quote = self.core.quote(pair, |p| self.fetch_ticker(p)).await?;
        Ok(quote.price)
    }

    async fn get_volume(&self, pair: &str) -> Result<Decimal> {
        let quote = self.core.quote(pair, |p| self.fetch_ticker(p)).await?;
        Ok(quote.volume)
    }

    fn is_connected(&self) -> bool {
        self.core.is_connected()
    }

    fn is_mock(&self) -> bool {
        self.core.is_mock()
    }

    fn name(&self) -> &str {
        self.core.name()
    }
}
