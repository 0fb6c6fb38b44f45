//! KyberSwap aggregator adapter.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::base::AdapterCore;
use super::limiter::RateLimiter;
use super::mock::{MockQuotes, PriceModel};
use super::utils::{first_decimal, pair_to_symbol};
use super::{AdapterError, MarketDataAdapter, Result};
use crate::config::VenueConfig;
use crate::domain::Quote;

/// Venue label stored on opportunities.
pub const KYBER_NAME: &str = "KyberSwap";

const DEFAULT_BASE_URL: &str = "https://api.kyber.org";
const DEFAULT_CHAIN_ID: u64 = 1;
const DEFAULT_PRICE_DECIMALS: u32 = 6;
const DEFAULT_MOCK_SEED: u64 = 0x6B7B_E2;

/// Finds the ticker for a "BASE-QUOTE" symbol.
///
/// Accepts a bare array, an array under `data`, or an object keyed by symbol.
pub(super) fn find_ticker<'a>(body: &'a Value, symbol: &str) -> Option<&'a Value> {
    let tickers = body.get("data").unwrap_or(body);

    match tickers {
        Value::Array(items) => items.iter().find(|item| {
            ["symbol", "pair"]
                .iter()
                .any(|key| item.get(key).and_then(Value::as_str) == Some(symbol))
        }),
        Value::Object(map) => map.get(symbol),
        _ => None,
    }
}

/// Builds a quote from one ticker entry.
pub(super) fn quote_from_ticker(ticker: &Value, pair: &str) -> Result<Quote> {
    let decimals = ticker
        .get("priceDecimals")
        .and_then(Value::as_u64)
        .map(|d| d.min(28) as u32)
        .unwrap_or(DEFAULT_PRICE_DECIMALS);

    let price = first_decimal(ticker, &["lastPrice", "price", "midPrice"])
        .ok_or_else(|| AdapterError::InvalidNumber(format!("{} price", pair)))?;
    let volume = first_decimal(ticker, &["quoteVolume", "baseVolume"]).unwrap_or(Decimal::ZERO);

    Ok(Quote::new(price.round_dp(decimals), volume.round_dp(2)))
}

/// KyberSwap ticker adapter.
///
/// Without an RPC endpoint the adapter quotes mock data only.
pub struct KyberAdapter {
    core: AdapterCore,
    http: HttpClient,
    base_url: String,
    rpc_url: Option<String>,
    chain_id: u64,
}

impl KyberAdapter {
    pub fn new(config: &VenueConfig, force_mock: bool) -> Result<Self> {
        let http = HttpClient::builder()
            .timeout(config.request_timeout)
            .build()?;

        let mock = force_mock || config.rpc_url.is_none();

        Ok(Self {
            core: AdapterCore::new(
                KYBER_NAME,
                mock,
                RateLimiter::new(config.min_request_interval),
                MockQuotes::new(
                    PriceModel::Aggregator,
                    config.mock_seed.unwrap_or(DEFAULT_MOCK_SEED),
                ),
            ),
            http,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            rpc_url: config.rpc_url.clone(),
            chain_id: config.chain_id.unwrap_or(DEFAULT_CHAIN_ID),
        })
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn fetch_quote(&self, pair: String) -> Result<Quote> {
        let url = format!("{}/market/tickers", self.base_url);
        debug!(adapter = KYBER_NAME, pair = %pair, "Fetching tickers");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(AdapterError::Api(format!(
                "{}: {}",
                status,
                String::from_utf8_lossy(&body)
            )));
        }

        let body: Value = serde_json::from_slice(&body)?;
        let symbol = pair_to_symbol(&pair, '-');
        let ticker = find_ticker(&body, &symbol).ok_or(AdapterError::TickerNotFound(pair.clone()))?;

        quote_from_ticker(ticker, &pair)
    }
}

#[async_trait]
impl MarketDataAdapter for KyberAdapter {
    async fn connect(&self) -> Result<()> {
        if self.rpc_url.is_none() {
            warn!(
                adapter = KYBER_NAME,
                "No RPC URL configured, mock quotes will be used"
            );
            self.core.enter_mock();
        }

        self.core.set_connected(true);
        info!(
            adapter = KYBER_NAME,
            mock = self.core.is_mock(),
            chain_id = self.chain_id,
            "Adapter connected"
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.core.set_connected(false);
        info!(adapter = KYBER_NAME, "Adapter disconnected");
        Ok(())
    }

    async fn get_price(&self, pair: &str) -> Result<Decimal> {
        let quote = self.core.quote(pair, |p| self.fetch_quote(p)).await?;
        Ok(quote.price)
    }

    async fn get_volume(&self, pair: &str) -> Result<Decimal> {
        let quote = self.core.quote(pair, |p| self.fetch_quote(p)).await?;
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
