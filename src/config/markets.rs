//! Market data venue configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Settings shared by both venues.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketsConfig {
    /// Force deterministic mock quotes on every venue (env: USE_MOCK_MARKETS).
    pub mock: bool,
    pub gate: VenueConfig,
    pub kyber: VenueConfig,
}

impl Default for MarketsConfig {
    fn default() -> Self {
        Self {
            mock: true,
            gate: VenueConfig::default(),
            kyber: VenueConfig::default(),
        }
    }
}

/// Settings for a single venue adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VenueConfig {
    /// REST endpoint override.
    pub base_url: Option<String>,
    /// API key (loaded from GATE_API_KEY).
    #[serde(skip)]
    pub api_key: String,
    /// API secret (loaded from GATE_API_SECRET).
    #[serde(skip)]
    pub api_secret: String,
    /// RPC endpoint (loaded from KYBER_RPC_URL).
    #[serde(skip)]
    pub rpc_url: Option<String>,
    /// Chain served by the venue, for on-chain venues.
    pub chain_id: Option<u64>,
    /// Minimum spacing between two outbound requests.
    #[serde(with = "duration")]
    pub min_request_interval: Duration,
    /// HTTP timeout for one request.
    #[serde(with = "duration")]
    pub request_timeout: Duration,
    /// Seed for mock quotes; a per-venue constant when unset.
    pub mock_seed: Option<u64>,
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: String::new(),
            api_secret: String::new(),
            rpc_url: None,
            chain_id: None,
            min_request_interval: Duration::from_millis(200),
            request_timeout: Duration::from_secs(8),
            mock_seed: None,
        }
    }
}
