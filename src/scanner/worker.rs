//! Execution of a single scan job.

use futures_util::{StreamExt, stream};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{
    OpportunityDetector, PairScanError, ScanContext, ScanError, ScanTally, SettingsProvider,
    StatsRecorder, TtlReaper, VenueQuote,
};
use crate::domain::{Pair, RuntimeSettings, ScanJobPayload, ScanJobResult};
use crate::queue::QueuedJob;

/// What one successfully scanned pair contributed to the job.
#[derive(Debug)]
struct PairScan {
    prices: [rust_decimal::Decimal; 2],
    opportunities: u32,
}

/// ScanWorker runs the scan pipeline for one claimed job.
pub struct ScanWorker {
    ctx: Arc<ScanContext>,
    settings: SettingsProvider,
    detector: OpportunityDetector,
    reaper: TtlReaper,
    stats: StatsRecorder,
}

impl ScanWorker {
    pub fn new(ctx: Arc<ScanContext>) -> Self {
        let store = ctx.store.clone();
        Self {
            settings: SettingsProvider::new(store.clone(), ctx.options.default_ttl_seconds),
            detector: OpportunityDetector::new(store.clone(), ctx.options.fee_rate),
            reaper: TtlReaper::new(store.clone()),
            stats: StatsRecorder::new(store),
            ctx,
        }
    }

    pub fn context(&self) -> &Arc<ScanContext> {
        &self.ctx
    }

    /// Scans the job's batch.
    ///
    /// Pair failures are collected into the result; only reaper, pair lookup,
    /// stats or queue failures fail the job.
    pub async fn process(&self, job: &QueuedJob) -> Result<ScanJobResult, ScanError> {
        let started = Instant::now();
        let payload = &job.payload;

        let settings = self.settings.load().await;
        if self
            .ctx
            .queue
            .ensure_scheduled(settings.scan_interval_seconds)
            .await?
        {
            info!(
                interval_seconds = settings.scan_interval_seconds,
                "Scheduled scan interval updated"
            );
        }

        let closed = self
            .reaper
            .expire_stale(settings.opportunity_ttl_seconds)
            .await?;

        let pairs = self.select_batch(payload, &settings).await?;
        if pairs.is_empty() {
            debug!(job_id = %job.id, "No pairs to scan");
            return Ok(ScanJobResult {
                closed_opportunities: closed,
                duration_ms: elapsed_ms(started),
                ..ScanJobResult::default()
            });
        }

        let settings = &settings;
        let outcomes: Vec<Result<PairScan, PairScanError>> = stream::iter(pairs.iter().cloned())
            .map(|pair| async move { self.scan_pair(&pair, settings).await })
            .buffered(self.ctx.options.pair_parallelism.max(1))
            .collect()
            .await;

        let mut tally = ScanTally {
            pair_id: payload.pair_id,
            total: u32::try_from(pairs.len()).unwrap_or(u32::MAX),
            ..ScanTally::default()
        };
        let mut errors = Vec::new();

        for outcome in outcomes {
            match outcome {
                Ok(scan) => {
                    tally.successful += 1;
                    tally.opportunities += scan.opportunities;
                    for price in scan.prices {
                        tally.prices.add(price);
                    }
                }
                Err(e) => {
                    warn!(job_id = %job.id, error = %e, "Pair scan failed");
                    tally.failed += 1;
                    errors.push(e.to_string());
                }
            }
        }

        tally.elapsed = started.elapsed();
        self.stats.record(&tally).await?;

        let result = ScanJobResult {
            pairs_scanned: tally.total,
            opportunities_found: tally.opportunities,
            closed_opportunities: closed,
            duration_ms: elapsed_ms(started),
            errors,
        };

        info!(
            job_id = %job.id,
            trigger = %payload.trigger,
            pairs = result.pairs_scanned,
            opportunities = result.opportunities_found,
            expired = result.closed_opportunities,
            errors = result.errors.len(),
            duration_ms = result.duration_ms,
            "Scan completed"
        );

        Ok(result)
    }

    /// The requested pair if it is active, otherwise the least recently
    /// updated active pairs.
    async fn select_batch(
        &self,
        payload: &ScanJobPayload,
        settings: &RuntimeSettings,
    ) -> Result<Vec<Pair>, ScanError> {
        if let Some(pair_id) = payload.pair_id {
            let pair = self.ctx.store.find_pair_by_id(pair_id).await?;
            return Ok(pair.filter(|p| p.is_active).into_iter().collect());
        }

        let limit = if payload.force {
            settings.max_concurrent_scans.saturating_mul(2)
        } else {
            settings.max_concurrent_scans
        };
        Ok(self.ctx.store.find_active_pairs(limit).await?)
    }

    async fn scan_pair(
        &self,
        pair: &Pair,
        settings: &RuntimeSettings,
    ) -> Result<PairScan, PairScanError> {
        let primary = self.ctx.venues.primary();
        let secondary = self.ctx.venues.secondary();
        let symbol = pair.symbol.as_str();

        let (primary_price, primary_volume, secondary_price, secondary_volume) = tokio::try_join!(
            primary.get_price(symbol),
            primary.get_volume(symbol),
            secondary.get_price(symbol),
            secondary.get_volume(symbol),
        )
        .map_err(|source| PairScanError::Quote {
            pair: pair.symbol.clone(),
            source,
        })?;

        let a = VenueQuote::new(primary.name(), primary_price, primary_volume);
        let b = VenueQuote::new(secondary.name(), secondary_price, secondary_volume);

        let found = self
            .detector
            .evaluate_pair(pair, &a, &b, settings)
            .await
            .map_err(|source| PairScanError::Persist {
                pair: pair.symbol.clone(),
                source,
            })?;

        debug!(
            pair = %pair.symbol,
            primary = %primary_price,
            secondary = %secondary_price,
            opportunities = found.len(),
            "Pair scanned"
        );

        Ok(PairScan {
            prices: [primary_price, secondary_price],
            opportunities: u32::try_from(found.len()).unwrap_or(u32::MAX),
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
