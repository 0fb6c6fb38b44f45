//! Tests for the scan pipeline.

use super::*;
use crate::domain::{JobStatus, OpportunityStatus, RuntimeSettings, ScanJobRequest};
use crate::markets::{AdapterError, MarketDataAdapter, Venues};
use crate::notification::{ErrorReporter, FailureReport, LogReporter, NotificationError};
use crate::queue::{JobQueue, RetryPolicy};
use crate::storage::{ScanStore, SqliteStorage, SqliteStorageConfig};
use chrono::{Datelike, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Mutex;

// ==================== Fakes ====================

/// Quotes the same price and volume for every pair, except listed failures.
struct FixedAdapter {
    name: String,
    price: Decimal,
    volume: Decimal,
    failing: Vec<String>,
    delay: Duration,
    connected: AtomicBool,
}

impl FixedAdapter {
    fn new(name: &str, price: Decimal, volume: Decimal) -> Self {
        Self {
            name: name.to_string(),
            price,
            volume,
            failing: Vec::new(),
            delay: Duration::ZERO,
            connected: AtomicBool::new(true),
        }
    }

    fn failing_for(mut self, pairs: &[&str]) -> Self {
        self.failing = pairs.iter().map(|p| p.to_string()).collect();
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn answer(&self, pair: &str, value: Decimal) -> crate::markets::Result<Decimal> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.iter().any(|p| p == pair) {
            return Err(AdapterError::TickerNotFound(pair.to_string()));
        }
        Ok(value)
    }
}

#[async_trait::async_trait]
impl MarketDataAdapter for FixedAdapter {
    async fn connect(&self) -> crate::markets::Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> crate::markets::Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn get_price(&self, pair: &str) -> crate::markets::Result<Decimal> {
        self.answer(pair, self.price).await
    }

    async fn get_volume(&self, pair: &str) -> crate::markets::Result<Decimal> {
        self.answer(pair, self.volume).await
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

/// Collects every report it receives.
#[derive(Default)]
struct RecordingReporter {
    reports: Mutex<Vec<FailureReport>>,
}

#[async_trait::async_trait]
impl ErrorReporter for RecordingReporter {
    async fn report(&self, report: &FailureReport) -> Result<(), NotificationError> {
        self.reports.lock().await.push(report.clone());
        Ok(())
    }

    fn report_async(&self, report: FailureReport) {
        if let Ok(mut reports) = self.reports.try_lock() {
            reports.push(report);
        }
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

// ==================== Harness ====================

struct Harness {
    _dir: TempDir,
    storage: Arc<SqliteStorage>,
    queue: Arc<JobQueue>,
    ctx: Arc<ScanContext>,
}

async fn harness_with(
    a: FixedAdapter,
    b: FixedAdapter,
    retry: RetryPolicy,
    reporter: Arc<dyn ErrorReporter>,
    options: ScanOptions,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(
        SqliteStorage::new(SqliteStorageConfig {
            path: dir.path().join("scanner.db").to_string_lossy().into_owned(),
            max_connections: 2,
        })
        .await
        .unwrap(),
    );
    let queue = Arc::new(
        JobQueue::open_path(dir.path().join("queue.db").to_str().unwrap(), retry)
            .await
            .unwrap(),
    );

    let store: Arc<dyn ScanStore> = storage.clone();
    let venues = Venues::new(Arc::new(a), Arc::new(b));
    let ctx = Arc::new(ScanContext::new(store, queue.clone(), venues, reporter, options));

    Harness {
        _dir: dir,
        storage,
        queue,
        ctx,
    }
}

async fn harness(a: FixedAdapter, b: FixedAdapter) -> Harness {
    harness_with(
        a,
        b,
        RetryPolicy::default(),
        Arc::new(LogReporter::new()),
        ScanOptions::default(),
    )
    .await
}

fn instant_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::ZERO,
    }
}

fn fast_pool(job_timeout: Duration) -> PoolOptions {
    PoolOptions {
        concurrency: 2,
        job_timeout,
        poll_interval: Duration::from_millis(20),
        maintenance_interval: Duration::from_millis(50),
        retention: Duration::from_secs(3600),
    }
}

const SYMBOLS: [&str; 5] = ["BTC/USDT", "ETH/USDT", "APE/USDT", "MANA/USDT", "BNB/USDT"];

async fn seed_pairs(storage: &SqliteStorage) -> Vec<crate::domain::Pair> {
    let mut pairs = Vec::new();
    for symbol in SYMBOLS {
        pairs.push(storage.ensure_pair(symbol).await.unwrap());
    }
    pairs
}

async fn claim_manual(queue: &JobQueue, request: ScanJobRequest) -> crate::queue::QueuedJob {
    queue.enqueue_manual(&request).await.unwrap();
    queue.claim_next().await.unwrap().unwrap()
}

async fn wait_for_status(queue: &JobQueue, id: &str, status: JobStatus) -> bool {
    for _ in 0..200 {
        if let Some(response) = queue.get_status(id).await.unwrap() {
            if response.status == status {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

// ==================== SettingsProvider ====================

#[tokio::test]
async fn test_settings_defaults_when_table_empty() {
    let h = harness(
        FixedAdapter::new("A", dec!(1), dec!(1)),
        FixedAdapter::new("B", dec!(1), dec!(1)),
    )
    .await;
    let provider = SettingsProvider::new(h.ctx.store.clone(), 420);

    let settings = provider.load().await;
    assert_eq!(settings.min_spread, dec!(1.5));
    assert_eq!(settings.max_investment, dec!(10000));
    assert_eq!(settings.scan_interval_seconds, 60);
    assert_eq!(settings.opportunity_ttl_seconds, 420);
    assert_eq!(settings.max_concurrent_scans, 5);
}

#[tokio::test]
async fn test_settings_overrides_and_per_key_fallback() {
    let h = harness(
        FixedAdapter::new("A", dec!(1), dec!(1)),
        FixedAdapter::new("B", dec!(1), dec!(1)),
    )
    .await;
    h.storage.set_setting("min_spread", "0.75", None).await.unwrap();
    h.storage.set_setting("max_investment", "abc", None).await.unwrap();
    h.storage.set_setting("scan_interval", "-5", None).await.unwrap();
    h.storage.set_setting("opportunity_expiry", " 90 ", None).await.unwrap();
    h.storage.set_setting("max_concurrent_scans", "0", None).await.unwrap();

    let settings = SettingsProvider::new(h.ctx.store.clone(), 300).load().await;
    assert_eq!(settings.min_spread, dec!(0.75));
    assert_eq!(settings.max_investment, dec!(10000));
    assert_eq!(settings.scan_interval_seconds, 60);
    assert_eq!(settings.opportunity_ttl_seconds, 90);
    assert_eq!(settings.max_concurrent_scans, 5);
}

#[tokio::test]
async fn test_settings_zero_min_spread_is_kept() {
    let h = harness(
        FixedAdapter::new("A", dec!(1), dec!(1)),
        FixedAdapter::new("B", dec!(1), dec!(1)),
    )
    .await;
    let provider = SettingsProvider::new(h.ctx.store.clone(), 300);

    h.storage.set_setting("min_spread", "0", None).await.unwrap();
    assert_eq!(provider.load().await.min_spread, Decimal::ZERO);

    h.storage.set_setting("min_spread", "-0.5", None).await.unwrap();
    assert_eq!(provider.load().await.min_spread, dec!(1.5));
}

#[tokio::test]
async fn test_settings_rejects_ttl_beyond_cap() {
    let h = harness(
        FixedAdapter::new("A", dec!(1), dec!(1)),
        FixedAdapter::new("B", dec!(1), dec!(1)),
    )
    .await;
    let provider = SettingsProvider::new(h.ctx.store.clone(), 300);

    h.storage
        .set_setting("opportunity_expiry", "400000000000", None)
        .await
        .unwrap();
    assert_eq!(provider.load().await.opportunity_ttl_seconds, 300);

    let cap = RuntimeSettings::MAX_OPPORTUNITY_TTL_SECONDS.to_string();
    h.storage
        .set_setting("opportunity_expiry", &cap, None)
        .await
        .unwrap();
    assert_eq!(
        provider.load().await.opportunity_ttl_seconds,
        RuntimeSettings::MAX_OPPORTUNITY_TTL_SECONDS
    );
}

#[tokio::test]
async fn test_settings_read_failure_yields_defaults() {
    let h = harness(
        FixedAdapter::new("A", dec!(1), dec!(1)),
        FixedAdapter::new("B", dec!(1), dec!(1)),
    )
    .await;
    h.storage.set_setting("min_spread", "3", None).await.unwrap();
    h.ctx.store.close().await.unwrap();

    let settings = SettingsProvider::new(h.ctx.store.clone(), 300).load().await;
    assert_eq!(settings, RuntimeSettings::default());
}

// ==================== OpportunityDetector ====================

#[tokio::test]
async fn test_detector_records_profitable_direction() {
    let h = harness(
        FixedAdapter::new("A", dec!(1), dec!(1)),
        FixedAdapter::new("B", dec!(1), dec!(1)),
    )
    .await;
    let pair = h.storage.ensure_pair("BTC/USDT").await.unwrap();
    let detector = OpportunityDetector::new(h.ctx.store.clone(), Decimal::ZERO);

    let a = VenueQuote::new("A", dec!(100), dec!(50000));
    let b = VenueQuote::new("B", dec!(105), dec!(50000));
    let found = detector
        .evaluate_pair(&pair, &a, &b, &RuntimeSettings::default())
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    let opp = &found[0];
    assert_eq!(opp.buy_exchange, "A");
    assert_eq!(opp.sell_exchange, "B");
    assert_eq!(opp.spread, dec!(5));
    assert_eq!(opp.volume, dec!(10000));
    assert_eq!(opp.profit_estimate, dec!(500));
    assert_eq!(opp.status, OpportunityStatus::Active);
    assert!(opp.expires_at > Utc::now());
}

#[tokio::test]
async fn test_detector_ignores_spread_below_minimum() {
    let h = harness(
        FixedAdapter::new("A", dec!(1), dec!(1)),
        FixedAdapter::new("B", dec!(1), dec!(1)),
    )
    .await;
    let pair = h.storage.ensure_pair("ETH/USDT").await.unwrap();
    let detector = OpportunityDetector::new(h.ctx.store.clone(), Decimal::ZERO);
    let settings = RuntimeSettings {
        min_spread: dec!(2),
        ..RuntimeSettings::default()
    };

    let a = VenueQuote::new("A", dec!(100), dec!(50000));
    let b = VenueQuote::new("B", dec!(100.5), dec!(50000));
    let found = detector.evaluate_pair(&pair, &a, &b, &settings).await.unwrap();

    assert!(found.is_empty());
    assert!(h.storage.list_opportunities(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_detector_clamps_to_liquidity_and_applies_fee() {
    let h = harness(
        FixedAdapter::new("A", dec!(1), dec!(1)),
        FixedAdapter::new("B", dec!(1), dec!(1)),
    )
    .await;
    let pair = h.storage.ensure_pair("APE/USDT").await.unwrap();
    let detector = OpportunityDetector::new(h.ctx.store.clone(), dec!(0.001));

    let buy = VenueQuote::new("A", dec!(100), dec!(3000));
    let sell = VenueQuote::new("B", dec!(110), dec!(8000));
    let opp = detector
        .evaluate_direction(&pair, &buy, &sell, &RuntimeSettings::default())
        .await
        .unwrap()
        .unwrap();

    // 10% of 3000 minus 0.1% on both legs.
    assert_eq!(opp.volume, dec!(3000));
    assert_eq!(opp.profit_estimate, dec!(294));
}

#[tokio::test]
async fn test_detector_huge_ttl_keeps_four_digit_expiry() {
    let h = harness(
        FixedAdapter::new("A", dec!(1), dec!(1)),
        FixedAdapter::new("B", dec!(1), dec!(1)),
    )
    .await;
    let pair = h.storage.ensure_pair("BNB/USDT").await.unwrap();
    let detector = OpportunityDetector::new(h.ctx.store.clone(), Decimal::ZERO);
    let settings = RuntimeSettings {
        opportunity_ttl_seconds: 400_000_000_000,
        ..RuntimeSettings::default()
    };

    let opp = detector
        .evaluate_direction(
            &pair,
            &VenueQuote::new("A", dec!(100), dec!(1000)),
            &VenueQuote::new("B", dec!(105), dec!(1000)),
            &settings,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(opp.expires_at.year(), 9999);

    // Far-future rows must still compare after the current time.
    let reaper = TtlReaper::new(h.ctx.store.clone());
    assert_eq!(reaper.expire_stale(u64::MAX).await.unwrap(), 0);

    let stored = h.storage.list_opportunities(None).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, OpportunityStatus::Active);
    assert_eq!(stored[0].expires_at.year(), 9999);
}

// ==================== TtlReaper ====================

#[tokio::test]
async fn test_reaper_expires_past_and_keeps_future() {
    let h = harness(
        FixedAdapter::new("A", dec!(1), dec!(1)),
        FixedAdapter::new("B", dec!(1), dec!(1)),
    )
    .await;
    let pair = h.storage.ensure_pair("BTC/USDT").await.unwrap();

    let template = crate::domain::NewOpportunity {
        pair_id: pair.id,
        buy_exchange: "A".into(),
        sell_exchange: "B".into(),
        buy_price: dec!(100),
        sell_price: dec!(105),
        spread: dec!(5),
        profit_estimate: dec!(500),
        volume: dec!(10000),
        status: OpportunityStatus::Active,
        expires_at: Utc::now() - chrono::Duration::seconds(1),
    };
    let past = h.ctx.store.create_opportunity(&template).await.unwrap();
    let future = h
        .ctx
        .store
        .create_opportunity(&crate::domain::NewOpportunity {
            expires_at: Utc::now() + chrono::Duration::seconds(10),
            ..template
        })
        .await
        .unwrap();

    let reaper = TtlReaper::new(h.ctx.store.clone());
    assert_eq!(reaper.expire_stale(300).await.unwrap(), 1);

    let stored = h.storage.list_opportunities(None).await.unwrap();
    let status_of = |id: i64| stored.iter().find(|o| o.id == id).unwrap().status;
    assert_eq!(status_of(past.id), OpportunityStatus::Expired);
    assert_eq!(status_of(future.id), OpportunityStatus::Active);

    // Nothing left to expire.
    assert_eq!(reaper.expire_stale(300).await.unwrap(), 0);
}

#[tokio::test]
async fn test_reaper_expires_untouched_records() {
    let h = harness(
        FixedAdapter::new("A", dec!(1), dec!(1)),
        FixedAdapter::new("B", dec!(1), dec!(1)),
    )
    .await;
    let pair = h.storage.ensure_pair("BTC/USDT").await.unwrap();
    let detector = OpportunityDetector::new(h.ctx.store.clone(), Decimal::ZERO);
    let settings = RuntimeSettings {
        opportunity_ttl_seconds: 3600,
        ..RuntimeSettings::default()
    };
    let opp = detector
        .evaluate_direction(
            &pair,
            &VenueQuote::new("A", dec!(100), dec!(1000)),
            &VenueQuote::new("B", dec!(105), dec!(1000)),
            &settings,
        )
        .await
        .unwrap()
        .unwrap();

    h.storage
        .backdate_opportunity(opp.id, Utc::now() - chrono::Duration::seconds(400))
        .await
        .unwrap();

    let reaper = TtlReaper::new(h.ctx.store.clone());
    assert_eq!(reaper.expire_stale(300).await.unwrap(), 1);
}

// ==================== Stats ====================

#[test]
fn test_price_summary() {
    let mut summary = PriceSummary::default();
    assert_eq!(summary.average(), None);

    for price in [dec!(1), dec!(2), dec!(4)] {
        summary.add(price);
    }

    assert_eq!(summary.count(), 3);
    assert_eq!(summary.min(), Some(dec!(1)));
    assert_eq!(summary.max(), Some(dec!(4)));
    assert_eq!(summary.average(), Some(dec!(2.333333)));
}

#[test]
fn test_tally_rounds_duration_to_seconds() {
    let tally = ScanTally {
        pair_id: Some(3),
        total: 2,
        successful: 1,
        failed: 1,
        elapsed: Duration::from_millis(1234),
        ..ScanTally::default()
    };

    let stats = tally.to_stats();
    assert_eq!(stats.average_scan_time, dec!(1.23));
    assert_eq!(stats.pair_id, Some(3));
    assert_eq!(stats.min_price, None);
}

// ==================== ScanWorker ====================

#[tokio::test]
async fn test_worker_records_pair_failures_and_completes() {
    let h = harness(
        FixedAdapter::new("A", dec!(100), dec!(50000)).failing_for(&["APE/USDT", "MANA/USDT"]),
        FixedAdapter::new("B", dec!(105), dec!(50000)),
    )
    .await;
    seed_pairs(&h.storage).await;

    let job = claim_manual(&h.queue, ScanJobRequest::default()).await;
    let worker = ScanWorker::new(h.ctx.clone());
    let result = worker.process(&job).await.unwrap();

    assert_eq!(result.pairs_scanned, 5);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors.iter().any(|e| e.contains("APE/USDT")));
    assert_eq!(result.opportunities_found, 3);

    h.queue.complete(&job.id, &result).await.unwrap();
    let status = h.queue.get_status(&job.id).await.unwrap().unwrap();
    assert_eq!(status.status, JobStatus::Completed);

    let stats = h.storage.list_scan_stats().await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].total_scans, 5);
    assert_eq!(stats[0].successful_scans, 3);
    assert_eq!(stats[0].failed_scans, 2);
    assert_eq!(stats[0].min_price, Some(dec!(100)));
    assert_eq!(stats[0].max_price, Some(dec!(105)));
    assert_eq!(stats[0].avg_price, Some(dec!(102.5)));
}

#[tokio::test]
async fn test_worker_empty_batch_writes_no_stats() {
    let h = harness(
        FixedAdapter::new("A", dec!(100), dec!(1000)),
        FixedAdapter::new("B", dec!(100), dec!(1000)),
    )
    .await;

    let job = claim_manual(&h.queue, ScanJobRequest::default()).await;
    let result = ScanWorker::new(h.ctx.clone()).process(&job).await.unwrap();

    assert_eq!(result.pairs_scanned, 0);
    assert_eq!(result.opportunities_found, 0);
    assert!(result.errors.is_empty());
    assert!(h.storage.list_scan_stats().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_worker_skips_inactive_requested_pair() {
    let h = harness(
        FixedAdapter::new("A", dec!(100), dec!(1000)),
        FixedAdapter::new("B", dec!(105), dec!(1000)),
    )
    .await;
    let pairs = seed_pairs(&h.storage).await;
    h.storage.set_pair_active(pairs[0].id, false).await.unwrap();

    let job = claim_manual(
        &h.queue,
        ScanJobRequest {
            pair_id: Some(pairs[0].id),
            force: false,
        },
    )
    .await;
    let result = ScanWorker::new(h.ctx.clone()).process(&job).await.unwrap();
    assert_eq!(result.pairs_scanned, 0);

    let job = claim_manual(
        &h.queue,
        ScanJobRequest {
            pair_id: Some(pairs[1].id),
            force: false,
        },
    )
    .await;
    let result = ScanWorker::new(h.ctx.clone()).process(&job).await.unwrap();
    assert_eq!(result.pairs_scanned, 1);
    assert_eq!(result.opportunities_found, 1);
    assert_eq!(h.storage.list_scan_stats().await.unwrap()[0].pair_id, Some(pairs[1].id));
}

#[tokio::test]
async fn test_worker_force_doubles_batch() {
    let h = harness(
        FixedAdapter::new("A", dec!(100), dec!(1000)),
        FixedAdapter::new("B", dec!(100), dec!(1000)),
    )
    .await;
    seed_pairs(&h.storage).await;
    h.storage.set_setting("max_concurrent_scans", "2", None).await.unwrap();

    let job = claim_manual(&h.queue, ScanJobRequest::default()).await;
    let result = ScanWorker::new(h.ctx.clone()).process(&job).await.unwrap();
    assert_eq!(result.pairs_scanned, 2);

    let job = claim_manual(
        &h.queue,
        ScanJobRequest {
            pair_id: None,
            force: true,
        },
    )
    .await;
    let result = ScanWorker::new(h.ctx.clone()).process(&job).await.unwrap();
    assert_eq!(result.pairs_scanned, 4);
}

#[tokio::test]
async fn test_worker_reconciles_schedule_and_expires_first() {
    let h = harness(
        FixedAdapter::new("A", dec!(100), dec!(1000)),
        FixedAdapter::new("B", dec!(100), dec!(1000)),
    )
    .await;
    h.storage.set_setting("scan_interval", "120", None).await.unwrap();
    let pair = h.storage.ensure_pair("BTC/USDT").await.unwrap();
    let detector = OpportunityDetector::new(h.ctx.store.clone(), Decimal::ZERO);
    let opp = detector
        .evaluate_direction(
            &pair,
            &VenueQuote::new("A", dec!(100), dec!(1000)),
            &VenueQuote::new("B", dec!(105), dec!(1000)),
            &RuntimeSettings::default(),
        )
        .await
        .unwrap()
        .unwrap();
    h.storage
        .backdate_opportunity(opp.id, Utc::now() - chrono::Duration::seconds(600))
        .await
        .unwrap();

    let job = claim_manual(&h.queue, ScanJobRequest::default()).await;
    let result = ScanWorker::new(h.ctx.clone()).process(&job).await.unwrap();

    assert_eq!(result.closed_opportunities, 1);
    assert_eq!(
        h.queue.scheduled_interval().await.unwrap(),
        Some(Duration::from_secs(120))
    );
}

// ==================== WorkerPool ====================

#[tokio::test]
async fn test_pool_completes_manual_job() {
    let h = harness(
        FixedAdapter::new("A", dec!(100), dec!(50000)),
        FixedAdapter::new("B", dec!(105), dec!(50000)),
    )
    .await;
    seed_pairs(&h.storage).await;

    let pool = WorkerPool::start(h.ctx.clone(), fast_pool(Duration::from_secs(10)));
    let response = h.queue.enqueue_manual(&ScanJobRequest::default()).await.unwrap();

    assert!(wait_for_status(&h.queue, &response.job_id, JobStatus::Completed).await);

    let job = h.queue.get_job(&response.job_id).await.unwrap().unwrap();
    let result = job.result.unwrap();
    assert_eq!(result.pairs_scanned, 5);
    assert_eq!(result.opportunities_found, 5);

    let stats = pool.shutdown().await;
    assert_eq!(stats.jobs_completed, 1);
    assert_eq!(stats.opportunities_found, 5);
    assert_eq!(stats.jobs_failed, 0);
}

#[tokio::test]
async fn test_pool_dead_letters_and_reports() {
    let reporter = Arc::new(RecordingReporter::default());
    let h = harness_with(
        FixedAdapter::new("A", dec!(100), dec!(1000)),
        FixedAdapter::new("B", dec!(100), dec!(1000)),
        instant_retry(2),
        reporter.clone(),
        ScanOptions::default(),
    )
    .await;

    // With the store gone the reaper fails, which fails the whole job.
    h.ctx.store.close().await.unwrap();

    let pool = WorkerPool::start(h.ctx.clone(), fast_pool(Duration::from_secs(10)));
    let response = h.queue.enqueue_manual(&ScanJobRequest::default()).await.unwrap();

    assert!(wait_for_status(&h.queue, &response.job_id, JobStatus::Failed).await);

    let stats = pool.shutdown().await;
    assert_eq!(stats.jobs_failed, 2);
    assert_eq!(stats.jobs_retried, 1);
    assert_eq!(stats.jobs_dead_lettered, 1);

    let dead = h.queue.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].job_id, response.job_id);
    assert_eq!(dead[0].attempts, 2);

    let reports = reporter.reports.lock().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].job_id, response.job_id);
    assert_eq!(reports[0].component, "scan-worker");
}

#[tokio::test]
async fn test_pool_times_out_slow_job() {
    let h = harness_with(
        FixedAdapter::new("A", dec!(100), dec!(1000)).with_delay(Duration::from_secs(5)),
        FixedAdapter::new("B", dec!(100), dec!(1000)),
        instant_retry(1),
        Arc::new(LogReporter::new()),
        ScanOptions::default(),
    )
    .await;
    seed_pairs(&h.storage).await;

    let pool = WorkerPool::start(h.ctx.clone(), fast_pool(Duration::from_millis(200)));
    let response = h.queue.enqueue_manual(&ScanJobRequest::default()).await.unwrap();

    assert!(wait_for_status(&h.queue, &response.job_id, JobStatus::Failed).await);
    pool.shutdown().await;

    let dead = h.queue.dead_letters().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert!(dead[0].reason.contains("timed out"));
}

#[tokio::test]
async fn test_pool_requeues_stalled_job() {
    let h = harness(
        FixedAdapter::new("A", dec!(100), dec!(50000)),
        FixedAdapter::new("B", dec!(105), dec!(50000)),
    )
    .await;
    seed_pairs(&h.storage).await;

    // Claimed but never finished, as if its worker died mid-run.
    let orphan = claim_manual(&h.queue, ScanJobRequest::default()).await;

    let pool = WorkerPool::start(h.ctx.clone(), fast_pool(Duration::from_millis(200)));
    assert!(wait_for_status(&h.queue, &orphan.id, JobStatus::Completed).await);

    let job = h.queue.get_job(&orphan.id).await.unwrap().unwrap();
    assert_eq!(job.attempts, 2);

    let stats = pool.shutdown().await;
    assert_eq!(stats.jobs_completed, 1);
}

#[tokio::test]
async fn test_pool_shutdown_when_idle() {
    let h = harness(
        FixedAdapter::new("A", dec!(100), dec!(1000)),
        FixedAdapter::new("B", dec!(100), dec!(1000)),
    )
    .await;

    let pool = WorkerPool::start(h.ctx.clone(), fast_pool(Duration::from_secs(1)));
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(pool.pending_jobs(), 0);

    let stats = tokio::time::timeout(Duration::from_secs(2), pool.shutdown())
        .await
        .unwrap();
    assert_eq!(stats, PoolStats::default());
}

#[tokio::test]
async fn test_context_close_disconnects_venues() {
    let h = harness(
        FixedAdapter::new("A", dec!(100), dec!(1000)),
        FixedAdapter::new("B", dec!(100), dec!(1000)),
    )
    .await;

    h.ctx.close().await;
    assert!(h.ctx.venues.status().values().all(|connected| !connected));
}
