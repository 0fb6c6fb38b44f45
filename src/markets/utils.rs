//! Common utilities for adapter implementations.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use super::{AdapterError, Result};
use crate::pricing::PAIR_SEPARATOR;

/// Converts "BTC/USDT" to the venue's form, e.g. "BTC_USDT" or "BTC-USDT".
pub fn pair_to_symbol(pair: &str, separator: char) -> String {
    pair.replace(PAIR_SEPARATOR, &separator.to_string())
}

/// Parses a decimal string field.
pub fn parse_decimal(raw: &str) -> Result<Decimal> {
    let trimmed = raw.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| AdapterError::InvalidNumber(raw.to_string()))
}

/// Reads a decimal from a JSON string or number. Other JSON types yield None.
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => parse_decimal(s).ok(),
        Value::Number(n) => parse_decimal(&n.to_string()).ok(),
        _ => None,
    }
}

/// Returns the first field among `keys` holding a decimal.
pub fn first_decimal(object: &Value, keys: &[&str]) -> Option<Decimal> {
    keys.iter()
        .filter_map(|key| object.get(key))
        .find_map(decimal_from_value)
}
