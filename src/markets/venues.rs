//! The pair of venues compared on every scan.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info};

use super::{GateIoAdapter, KyberAdapter, MarketDataAdapter, Result};
use crate::config::MarketsConfig;

/// Venues holds the two adapters a scan compares.
///
/// Quotes from `primary` and `secondary` are compared in both directions,
/// so the order only affects log output.
#[derive(Clone)]
pub struct Venues {
    primary: Arc<dyn MarketDataAdapter>,
    secondary: Arc<dyn MarketDataAdapter>,
}

impl Venues {
    pub fn new(primary: Arc<dyn MarketDataAdapter>, secondary: Arc<dyn MarketDataAdapter>) -> Self {
        Self { primary, secondary }
    }

    /// Builds Gate.io and KyberSwap adapters from configuration.
    pub fn from_config(config: &MarketsConfig) -> Result<Self> {
        let gate = GateIoAdapter::new(&config.gate, config.mock)?;
        let kyber = KyberAdapter::new(&config.kyber, config.mock)?;

        Ok(Self::new(Arc::new(gate), Arc::new(kyber)))
    }

    pub fn primary(&self) -> &Arc<dyn MarketDataAdapter> {
        &self.primary
    }

    pub fn secondary(&self) -> &Arc<dyn MarketDataAdapter> {
        &self.secondary
    }

    /// Connects both adapters concurrently. Fails if either fails.
    pub async fn connect_all(&self) -> Result<()> {
        info!(
            primary = self.primary.name(),
            secondary = self.secondary.name(),
            "Connecting market adapters"
        );

        tokio::try_join!(self.primary.connect(), self.secondary.connect())?;
        Ok(())
    }

    /// Disconnects both adapters, logging failures instead of stopping.
    pub async fn disconnect_all(&self) {
        for adapter in [&self.primary, &self.secondary] {
            info!(adapter = adapter.name(), "Disconnecting market adapter");
            if let Err(e) = adapter.disconnect().await {
                error!(adapter = adapter.name(), error = %e, "Failed to disconnect market adapter");
            }
        }
    }

    /// Connection status keyed by venue name.
    pub fn status(&self) -> HashMap<String, bool> {
        [&self.primary, &self.secondary]
            .iter()
            .map(|adapter| (adapter.name().to_string(), adapter.is_connected()))
            .collect()
    }
}
