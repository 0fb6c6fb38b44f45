//! State and quote plumbing shared by every adapter.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use super::limiter::RateLimiter;
use super::mock::MockQuotes;
use super::{AdapterError, Result};
use crate::domain::Quote;
use crate::pricing::normalize_pair_symbol;

pub(super) struct AdapterCore {
    name: &'static str,
    connected: AtomicBool,
    mock: AtomicBool,
    limiter: RateLimiter,
    mock_quotes: MockQuotes,
}

impl AdapterCore {
    pub(super) fn new(
        name: &'static str,
        mock: bool,
        limiter: RateLimiter,
        mock_quotes: MockQuotes,
    ) -> Self {
        Self {
            name,
            connected: AtomicBool::new(false),
            mock: AtomicBool::new(mock),
            limiter,
            mock_quotes,
        }
    }

    pub(super) fn name(&self) -> &'static str {
        self.name
    }

    pub(super) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub(super) fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub(super) fn is_mock(&self) -> bool {
        self.mock.load(Ordering::SeqCst)
    }

    /// Mock mode is one-way for the lifetime of the adapter.
    pub(super) fn enter_mock(&self) {
        self.mock.store(true, Ordering::SeqCst);
    }

    /// Checks the connection and normalizes the symbol.
    fn prepare(&self, pair: &str) -> Result<String> {
        if !self.is_connected() {
            return Err(AdapterError::NotConnected(self.name.to_string()));
        }
        Ok(normalize_pair_symbol(pair)?)
    }

    /// Runs one rate-limited quote request.
    ///
    /// In mock mode `live` is never called. A failed live request is logged
    /// and answered with a mock quote.
    pub(super) async fn quote<F, Fut>(&self, pair: &str, live: F) -> Result<Quote>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<Quote>>,
    {
        let normalized = self.prepare(pair)?;

        let quote = self
            .limiter
            .schedule(async {
                if self.is_mock() {
                    return self.mock_quotes.quote(&normalized);
                }

                match live(normalized.clone()).await {
                    Ok(quote) => quote,
                    Err(e) => {
                        warn!(
                            adapter = self.name,
                            pair = %normalized,
                            error = %e,
                            "Live quote failed, falling back to mock data"
                        );
                        self.mock_quotes.quote(&normalized)
                    }
                }
            })
            .await;

        Ok(quote)
    }
}
