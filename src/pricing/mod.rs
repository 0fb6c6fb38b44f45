//! Decimal pricing helpers shared by the adapters, the detector and the worker.
//!
//! All money math goes through `rust_decimal::Decimal` (28 significant digits)
//! so sub-cent price differences survive the spread calculation.

use rust_decimal::Decimal;
use thiserror::Error;

/// Separator between base and quote asset in a normalized symbol.
pub const PAIR_SEPARATOR: char = '/';

/// Quote assets recognized when splitting a compact symbol like "ETHUSDT".
/// Order matters: "USDT" must be tried before "USD".
const KNOWN_QUOTES: [&str; 5] = ["USDT", "USD", "BTC", "ETH", "BNB"];

/// Quote asset assumed when a compact symbol has no known suffix.
const DEFAULT_QUOTE: &str = "USDT";

/// Symbol normalization errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SymbolError {
    #[error("pair symbol is required")]
    Empty,
    #[error("cannot derive base asset from symbol {0}")]
    Unparseable(String),
}

/// Normalizes a pair symbol to "BASE/QUOTE".
///
/// Symbols that already contain a separator are only trimmed and upper-cased.
/// Compact forms ("btc_usdt", "ethusd") are stripped of `-`/`_`, upper-cased and
/// split on a known quote suffix, falling back to USDT.
pub fn normalize_pair_symbol(symbol: &str) -> Result<String, SymbolError> {
    let trimmed = symbol.trim();
    if trimmed.is_empty() {
        return Err(SymbolError::Empty);
    }

    if trimmed.contains(PAIR_SEPARATOR) {
        return Ok(trimmed.to_uppercase());
    }

    let sanitized: String = trimmed
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .collect::<String>()
        .to_uppercase();

    let (base, quote) = KNOWN_QUOTES
        .iter()
        .find_map(|quote| {
            sanitized
                .strip_suffix(quote)
                .map(|base| (base.to_string(), *quote))
        })
        .unwrap_or_else(|| (sanitized.clone(), DEFAULT_QUOTE));

    if base.is_empty() {
        return Err(SymbolError::Unparseable(symbol.to_string()));
    }

    Ok(format!("{}{}{}", base, PAIR_SEPARATOR, quote))
}

/// Splits a symbol into its base and quote assets after normalizing it.
pub fn split_pair_symbol(symbol: &str) -> Result<(String, String), SymbolError> {
    let normalized = normalize_pair_symbol(symbol)?;
    match normalized.split_once(PAIR_SEPARATOR) {
        Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
            Ok((base.to_string(), quote.to_string()))
        }
        _ => Err(SymbolError::Unparseable(symbol.to_string())),
    }
}

/// Percentage gain of selling at `sell` what was bought at `buy`.
/// A zero buy price yields zero.
pub fn calculate_spread(buy: Decimal, sell: Decimal) -> Decimal {
    if buy.is_zero() {
        return Decimal::ZERO;
    }

    // Overflow only happens on nonsense inputs; report no spread for those.
    (sell - buy)
        .checked_div(buy)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

/// Gain in quote currency of trading `notional` at the given percentage spread.
pub fn calculate_potential_gain(spread: Decimal, notional: Decimal) -> Decimal {
    spread / Decimal::ONE_HUNDRED * notional
}

/// Deducts taker fees on both legs: `gain - notional * fee_rate * 2`.
/// `fee_rate` is a fraction (0.001 = 0.1%); zero leaves the gain untouched.
pub fn apply_fee(gain: Decimal, notional: Decimal, fee_rate: Decimal) -> Decimal {
    if fee_rate.is_zero() {
        return gain;
    }
    gain - notional * fee_rate * Decimal::TWO
}

/// Trade size limited by both the investment cap and venue liquidity.
pub fn clamp_trade_size(max_investment: Decimal, available_volume: Decimal) -> Decimal {
    max_investment.min(available_volume)
}

/// Mean of `history` plus `latest`, ignoring negative and non-finite samples,
/// rounded to the nearest integer. Returns 0 when nothing is left.
pub fn calculate_average_duration(history: &[f64], latest: f64) -> u64 {
    let values: Vec<f64> = history
        .iter()
        .copied()
        .chain(std::iter::once(latest))
        .filter(|v| v.is_finite() && *v >= 0.0)
        .collect();

    if values.is_empty() {
        return 0;
    }

    let total: f64 = values.iter().sum();
    (total / values.len() as f64).round() as u64
}
