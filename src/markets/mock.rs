//! Deterministic synthetic quotes.
//!
//! Each adapter owns a seeded generator, so a given seed always yields the
//! same sequence of quotes. Values stay inside venue-specific bands around
//! a fixed base price, which is what tests assert on.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::domain::Quote;

/// How a venue's synthetic prices are distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceModel {
    /// Centralized book: price in `[base, base * 1.02)`,
    /// volume in `[100000, 150000)`.
    Orderbook,
    /// AMM aggregator: price in `[base * 0.985, base * 1.015)`,
    /// volume in `[80000, 112000)`.
    Aggregator,
}

impl PriceModel {
    fn base_price(&self, pair: &str) -> f64 {
        match (self, pair) {
            (PriceModel::Orderbook, "BTC/USDT") => 45_000.0,
            (PriceModel::Orderbook, "ETH/USDT") => 2_500.0,
            (PriceModel::Orderbook, "APE/USDT") => 1.5,
            (PriceModel::Orderbook, "MANA/USDT") => 0.5,
            (PriceModel::Orderbook, "BNB/USDT") => 300.0,
            (PriceModel::Orderbook, _) => 50.0,
            (PriceModel::Aggregator, "BTC/USDT") => 45_150.0,
            (PriceModel::Aggregator, "ETH/USDT") => 2_515.0,
            (PriceModel::Aggregator, "APE/USDT") => 1.52,
            (PriceModel::Aggregator, "MANA/USDT") => 0.51,
            (PriceModel::Aggregator, "BNB/USDT") => 301.0,
            (PriceModel::Aggregator, _) => 52.0,
        }
    }

    fn sample(&self, base: f64, rng: &mut StdRng) -> (f64, f64) {
        let price_draw: f64 = rng.gen_range(0.0..1.0);
        let volume_draw: f64 = rng.gen_range(0.0..1.0);

        match self {
            PriceModel::Orderbook => (
                base + price_draw * base * 0.02,
                100_000.0 + volume_draw * 50_000.0,
            ),
            PriceModel::Aggregator => (
                base * (1.0 + (price_draw - 0.5) * 0.03),
                80_000.0 + volume_draw * 32_000.0,
            ),
        }
    }
}

/// Seeded quote generator for one adapter.
pub struct MockQuotes {
    model: PriceModel,
    rng: Mutex<StdRng>,
}

impl MockQuotes {
    pub fn new(model: PriceModel, seed: u64) -> Self {
        Self {
            model,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn model(&self) -> PriceModel {
        self.model
    }

    /// Next synthetic quote for a normalized pair symbol.
    pub fn quote(&self, pair: &str) -> Quote {
        let base = self.model.base_price(pair);
        let (price, volume) = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            self.model.sample(base, &mut rng)
        };

        Quote::new(
            Decimal::from_f64(price).unwrap_or_default().round_dp(6),
            Decimal::from_f64(volume).unwrap_or_default().round_dp(2),
        )
    }
}
