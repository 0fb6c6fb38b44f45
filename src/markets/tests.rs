//! Tests for market adapters.

use super::kyber::{find_ticker, quote_from_ticker};
use super::*;
use crate::config::{MarketsConfig, VenueConfig};
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn venue_config(seed: u64) -> VenueConfig {
    VenueConfig {
        min_request_interval: Duration::from_millis(1),
        mock_seed: Some(seed),
        ..VenueConfig::default()
    }
}

// ==================== Mock quotes ====================

#[test]
fn test_orderbook_mock_stays_in_band() {
    let quotes = MockQuotes::new(PriceModel::Orderbook, 7);
    for _ in 0..200 {
        let quote = quotes.quote("BTC/USDT");
        assert!(quote.price >= dec!(45000) && quote.price <= dec!(45900), "{}", quote.price);
        assert!(quote.volume >= dec!(100000) && quote.volume <= dec!(150000));
        assert!(quote.price.scale() <= 6);
        assert!(quote.volume.scale() <= 2);
    }
}

#[test]
fn test_aggregator_mock_stays_in_band() {
    let quotes = MockQuotes::new(PriceModel::Aggregator, 7);
    for _ in 0..200 {
        let quote = quotes.quote("ETH/USDT");
        assert!(quote.price >= dec!(2477.275) && quote.price <= dec!(2552.725), "{}", quote.price);
        assert!(quote.volume >= dec!(80000) && quote.volume <= dec!(112000));
    }
}

#[test]
fn test_mock_unknown_pair_uses_default_base() {
    let quotes = MockQuotes::new(PriceModel::Orderbook, 1);
    let quote = quotes.quote("DOGE/USDT");
    assert!(quote.price >= dec!(50) && quote.price <= dec!(51));
}

#[test]
fn test_mock_is_deterministic_per_seed() {
    let a = MockQuotes::new(PriceModel::Aggregator, 99);
    let b = MockQuotes::new(PriceModel::Aggregator, 99);
    for _ in 0..10 {
        let qa = a.quote("BNB/USDT");
        let qb = b.quote("BNB/USDT");
        assert_eq!(qa.price, qb.price);
        assert_eq!(qa.volume, qb.volume);
    }
}

// ==================== Adapters ====================

#[tokio::test]
async fn test_get_price_before_connect_fails() {
    let adapter = GateIoAdapter::new(&venue_config(1), true).unwrap();
    let result = adapter.get_price("BTC/USDT").await;
    assert!(matches!(result, Err(AdapterError::NotConnected(_))));
}

#[tokio::test]
async fn test_empty_symbol_fails() {
    let adapter = KyberAdapter::new(&venue_config(1), true).unwrap();
    adapter.connect().await.unwrap();

    let result = adapter.get_volume("  ").await;
    assert!(matches!(result, Err(AdapterError::Symbol(_))));
}

#[tokio::test]
async fn test_gate_without_credentials_enters_mock_mode() {
    let adapter = GateIoAdapter::new(&venue_config(1), false).unwrap();
    assert!(!adapter.is_mock());

    adapter.connect().await.unwrap();
    assert!(adapter.is_connected());
    assert!(adapter.is_mock());
    assert_eq!(adapter.name(), "Gate.io");
}

#[tokio::test]
async fn test_kyber_without_rpc_is_mock() {
    let adapter = KyberAdapter::new(&venue_config(1), false).unwrap();
    assert!(adapter.is_mock());
    assert_eq!(adapter.chain_id(), 1);

    adapter.connect().await.unwrap();
    let price = adapter.get_price("btc_usdt").await.unwrap();
    assert!(price >= dec!(44472.75) && price <= dec!(45827.25));
}

#[tokio::test]
async fn test_compact_symbol_is_normalized() {
    let adapter = GateIoAdapter::new(&venue_config(3), true).unwrap();
    adapter.connect().await.unwrap();

    let price = adapter.get_price("ethusdt").await.unwrap();
    assert!(price >= dec!(2500) && price <= dec!(2550));
}

#[tokio::test]
async fn test_live_failure_falls_back_to_mock() {
    let mut config = venue_config(5);
    config.base_url = Some("http://127.0.0.1:1".into());
    config.request_timeout = Duration::from_secs(1);
    config.api_key = "key".into();
    config.api_secret = "secret".into();

    let adapter = GateIoAdapter::new(&config, false).unwrap();
    adapter.connect().await.unwrap();
    assert!(!adapter.is_mock());

    let price = adapter.get_price("BTC/USDT").await.unwrap();
    assert!(price >= dec!(45000) && price <= dec!(45900));
}

#[tokio::test]
async fn test_disconnect_blocks_quotes() {
    let adapter = GateIoAdapter::new(&venue_config(1), true).unwrap();
    adapter.connect().await.unwrap();
    adapter.disconnect().await.unwrap();
    adapter.disconnect().await.unwrap();

    assert!(!adapter.is_connected());
    assert!(adapter.get_price("BTC/USDT").await.is_err());
}

// ==================== Kyber ticker parsing ====================

#[test]
fn test_find_ticker_shapes() {
    let bare = json!([{ "symbol": "BTC-USDT", "lastPrice": "1" }]);
    let wrapped = json!({ "data": [{ "pair": "BTC-USDT", "price": 2 }] });
    let keyed = json!({ "BTC-USDT": { "midPrice": "3" } });

    assert!(find_ticker(&bare, "BTC-USDT").is_some());
    assert!(find_ticker(&wrapped, "BTC-USDT").is_some());
    assert!(find_ticker(&keyed, "BTC-USDT").is_some());
    assert!(find_ticker(&bare, "ETH-USDT").is_none());
    assert!(find_ticker(&json!("nope"), "BTC-USDT").is_none());
}

#[test]
fn test_quote_from_ticker_rounds() {
    let ticker = json!({
        "lastPrice": "45123.456789",
        "priceDecimals": 2,
        "quoteVolume": 1234.567
    });
    let quote = quote_from_ticker(&ticker, "BTC/USDT").unwrap();
    assert_eq!(quote.price, dec!(45123.46));
    assert_eq!(quote.volume, dec!(1234.57));
}

#[test]
fn test_quote_from_ticker_fallback_fields() {
    let ticker = json!({ "midPrice": "0.512345678", "baseVolume": "10" });
    let quote = quote_from_ticker(&ticker, "MANA/USDT").unwrap();
    assert_eq!(quote.price, dec!(0.512346));
    assert_eq!(quote.volume, dec!(10));

    let missing = json!({ "quoteVolume": "10" });
    assert!(matches!(
        quote_from_ticker(&missing, "MANA/USDT"),
        Err(AdapterError::InvalidNumber(_))
    ));
}

#[test]
fn test_pair_to_symbol() {
    assert_eq!(utils::pair_to_symbol("BTC/USDT", '_'), "BTC_USDT");
    assert_eq!(utils::pair_to_symbol("BTC/USDT", '-'), "BTC-USDT");
}

// ==================== Rate limiter ====================

#[tokio::test]
async fn test_limiter_spaces_requests() {
    let limiter = RateLimiter::new(Duration::from_millis(50));
    let start = Instant::now();

    for _ in 0..3 {
        limiter.schedule(async {}).await;
    }

    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn test_limiter_allows_one_in_flight() {
    let limiter = Arc::new(RateLimiter::new(Duration::from_millis(1)));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let tasks = (0..5).map(|_| {
        let limiter = limiter.clone();
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        async move {
            limiter
                .schedule(async {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
                .await
        }
    });
    futures_util::future::join_all(tasks).await;

    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

// ==================== Venues ====================

/// Stub adapter for venue tests.
struct StubAdapter {
    name: String,
    connected: AtomicBool,
    fail_connect: bool,
}

impl StubAdapter {
    fn new(name: &str, fail_connect: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            connected: AtomicBool::new(false),
            fail_connect,
        })
    }
}

#[async_trait::async_trait]
impl MarketDataAdapter for StubAdapter {
    async fn connect(&self) -> Result<()> {
        if self.fail_connect {
            return Err(AdapterError::Api("stub connection failure".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn get_price(&self, _pair: &str) -> Result<rust_decimal::Decimal> {
        Ok(dec!(1))
    }

    async fn get_volume(&self, _pair: &str) -> Result<rust_decimal::Decimal> {
        Ok(dec!(1))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_mock(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[tokio::test]
async fn test_venues_connect_and_status() {
    let venues = Venues::new(StubAdapter::new("a", false), StubAdapter::new("b", false));
    venues.connect_all().await.unwrap();

    let status = venues.status();
    assert_eq!(status.get("a"), Some(&true));
    assert_eq!(status.get("b"), Some(&true));

    venues.disconnect_all().await;
    assert!(venues.status().values().all(|connected| !connected));
}

#[tokio::test]
async fn test_venues_connect_fails_if_one_fails() {
    let venues = Venues::new(StubAdapter::new("a", false), StubAdapter::new("b", true));
    assert!(venues.connect_all().await.is_err());
}

#[tokio::test]
async fn test_venues_from_config_forced_mock() {
    let config = MarketsConfig::default();
    let venues = Venues::from_config(&config).unwrap();
    venues.connect_all().await.unwrap();

    assert!(venues.primary().is_mock());
    assert!(venues.secondary().is_mock());
    assert_eq!(venues.primary().name(), "Gate.io");
    assert_eq!(venues.secondary().name(), "KyberSwap");
}
