//! Runtime settings lookup.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

use crate::domain::{RuntimeSettings, SETTING_KEYS};
use crate::storage::ScanStore;

/// SettingsProvider reads the operator-tunable settings in one batch.
///
/// It never fails: missing, unparseable or out-of-range values fall back to
/// their defaults one key at a time, and a failed read yields all defaults.
/// `min_spread` may be zero; every other value must be positive, and the
/// opportunity TTL is capped at [`RuntimeSettings::MAX_OPPORTUNITY_TTL_SECONDS`].
pub struct SettingsProvider {
    store: Arc<dyn ScanStore>,
    default_ttl_seconds: u64,
}

impl SettingsProvider {
    pub fn new(store: Arc<dyn ScanStore>, default_ttl_seconds: u64) -> Self {
        Self {
            store,
            default_ttl_seconds,
        }
    }

    /// Defaults with the configured opportunity TTL.
    pub fn defaults(&self) -> RuntimeSettings {
        RuntimeSettings {
            opportunity_ttl_seconds: self.default_ttl_seconds,
            ..RuntimeSettings::default()
        }
    }

    pub async fn load(&self) -> RuntimeSettings {
        match self.store.find_settings(&SETTING_KEYS).await {
            Ok(values) => self.resolve(&values),
            Err(e) => {
                warn!(error = %e, "Failed to read settings, using defaults");
                self.defaults()
            }
        }
    }

    fn resolve(&self, values: &HashMap<String, String>) -> RuntimeSettings {
        let defaults = self.defaults();

        RuntimeSettings {
            min_spread: setting_or(
                values,
                RuntimeSettings::MIN_SPREAD_KEY,
                defaults.min_spread,
                |v| *v >= Decimal::ZERO,
            ),
            max_investment: setting_or(
                values,
                RuntimeSettings::MAX_INVESTMENT_KEY,
                defaults.max_investment,
                |v| *v > Decimal::ZERO,
            ),
            scan_interval_seconds: setting_or(
                values,
                RuntimeSettings::SCAN_INTERVAL_KEY,
                defaults.scan_interval_seconds,
                |v| *v > 0,
            ),
            opportunity_ttl_seconds: setting_or(
                values,
                RuntimeSettings::OPPORTUNITY_EXPIRY_KEY,
                defaults.opportunity_ttl_seconds,
                |v| (1..=RuntimeSettings::MAX_OPPORTUNITY_TTL_SECONDS).contains(v),
            ),
            max_concurrent_scans: setting_or(
                values,
                RuntimeSettings::MAX_CONCURRENT_SCANS_KEY,
                defaults.max_concurrent_scans,
                |v| *v > 0,
            ),
        }
    }
}

/// Parses `values[key]` and keeps it only if `accept` allows it.
fn setting_or<T>(
    values: &HashMap<String, String>,
    key: &str,
    default: T,
    accept: impl Fn(&T) -> bool,
) -> T
where
    T: FromStr + Display,
{
    let Some(raw) = values.get(key) else {
        return default;
    };

    match raw.trim().parse::<T>() {
        Ok(value) if accept(&value) => value,
        _ => {
            warn!(key = %key, value = %raw, default = %default, "Ignoring invalid setting");
            default
        }
    }
}
