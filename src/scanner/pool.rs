//! Worker pool consuming the scan queues.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{ScanContext, ScanError, ScanWorker};
use crate::config::QueueConfig;
use crate::domain::ScanJobResult;
use crate::notification::FailureReport;
use crate::pricing::calculate_average_duration;
use crate::queue::{FailOutcome, QueuedJob};

/// Component name attached to failure reports.
const REPORT_COMPONENT: &str = "scan-worker";

/// Job durations kept for the running average.
const DURATION_HISTORY: usize = 100;

/// Slack past the job timeout before an active job counts as stalled.
const STALL_GRACE: Duration = Duration::from_secs(1);

/// Pool sizing and timing.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolOptions {
    pub concurrency: usize,
    pub job_timeout: Duration,
    pub poll_interval: Duration,
    pub maintenance_interval: Duration,
    pub retention: Duration,
}

impl From<&QueueConfig> for PoolOptions {
    fn from(config: &QueueConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            job_timeout: config.job_timeout,
            poll_interval: config.poll_interval,
            maintenance_interval: config.maintenance_interval,
            retention: config.retention,
        }
    }
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

/// Runtime statistics for the pool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolStats {
    pub jobs_completed: u64,
    /// Failed attempts, retried or not.
    pub jobs_failed: u64,
    pub jobs_retried: u64,
    pub jobs_dead_lettered: u64,
    pub opportunities_found: u64,
    pub pairs_scanned: u64,
    /// Mean duration of recent completed jobs.
    pub average_job_ms: u64,
}

#[derive(Default)]
struct StatsState {
    stats: PoolStats,
    durations: Vec<f64>,
}

impl StatsState {
    fn record_completed(&mut self, result: &ScanJobResult, elapsed: Duration) {
        let latest = elapsed.as_secs_f64() * 1000.0;
        self.stats.jobs_completed += 1;
        self.stats.opportunities_found += u64::from(result.opportunities_found);
        self.stats.pairs_scanned += u64::from(result.pairs_scanned);
        self.stats.average_job_ms = calculate_average_duration(&self.durations, latest);

        self.durations.push(latest);
        if self.durations.len() > DURATION_HISTORY {
            self.durations.remove(0);
        }
    }
}

struct Shared {
    worker: ScanWorker,
    options: PoolOptions,
    stats: Mutex<StatsState>,
    pending: AtomicU64,
}

/// WorkerPool runs a fixed number of workers over the manual and scheduled
/// queues, plus one maintenance task that requeues stalled jobs, promotes
/// recurring scans, prunes old jobs and refreshes the depth gauge.
pub struct WorkerPool {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
    started_at: Instant,
}

impl WorkerPool {
    pub fn start(ctx: Arc<ScanContext>, options: PoolOptions) -> Self {
        let (shutdown, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            worker: ScanWorker::new(ctx),
            options,
            stats: Mutex::new(StatsState::default()),
            pending: AtomicU64::new(0),
        });

        let mut handles = Vec::with_capacity(shared.options.concurrency + 1);
        for id in 0..shared.options.concurrency {
            let shared = shared.clone();
            let rx = shutdown.subscribe();
            handles.push(tokio::spawn(async move { run_worker(id, shared, rx).await }));
        }
        {
            let shared = shared.clone();
            let rx = shutdown.subscribe();
            handles.push(tokio::spawn(async move { run_maintenance(shared, rx).await }));
        }

        info!(
            concurrency = shared.options.concurrency,
            job_timeout = ?shared.options.job_timeout,
            "Worker pool started"
        );

        Self {
            shared,
            shutdown,
            handles,
            started_at: Instant::now(),
        }
    }

    /// Returns a copy of the current statistics.
    pub async fn stats(&self) -> PoolStats {
        self.shared.stats.lock().await.stats.clone()
    }

    /// Waiting + delayed + active jobs as of the last maintenance tick.
    pub fn pending_jobs(&self) -> u64 {
        self.shared.pending.load(Ordering::Relaxed)
    }

    /// Stops claiming, waits for in-flight jobs and returns final stats.
    pub async fn shutdown(self) -> PoolStats {
        info!("Stopping worker pool...");
        let _ = self.shutdown.send(true);

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task ended abnormally");
            }
        }

        let stats = self.shared.stats.lock().await.stats.clone();
        info!(
            uptime = ?self.started_at.elapsed(),
            completed = stats.jobs_completed,
            failed = stats.jobs_failed,
            retried = stats.jobs_retried,
            dead_lettered = stats.jobs_dead_lettered,
            opportunities = stats.opportunities_found,
            average_job_ms = stats.average_job_ms,
            "Worker pool stopped"
        );
        stats
    }
}

async fn run_worker(id: usize, shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let queue = shared.worker.context().queue.clone();
    debug!(worker = id, "Worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match queue.claim_next().await {
            Ok(Some(job)) => run_job(&shared, job).await,
            Ok(None) => {
                if idle(&mut shutdown, shared.options.poll_interval).await {
                    break;
                }
            }
            Err(e) => {
                warn!(worker = id, error = %e, "Failed to claim job");
                if idle(&mut shutdown, shared.options.poll_interval).await {
                    break;
                }
            }
        }
    }

    debug!(worker = id, "Worker stopped");
}

/// Sleeps for `period` unless shutdown is signalled first. Returns true when
/// the worker should stop.
async fn idle(shutdown: &mut watch::Receiver<bool>, period: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(period) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

async fn run_job(shared: &Arc<Shared>, job: QueuedJob) {
    let started = Instant::now();
    let outcome = execute(shared, &job).await;
    let queue = &shared.worker.context().queue;

    match outcome {
        Ok(result) => {
            match queue.complete(&job.id, &result).await {
                Ok(()) => shared
                    .stats
                    .lock()
                    .await
                    .record_completed(&result, started.elapsed()),
                Err(e) => {
                    error!(job_id = %job.id, error = %e, "Failed to mark job completed");
                    let reason = format!("failed to store result: {e}");
                    record_failure(shared, &job, &reason).await;
                }
            }
        }
        Err(e) => {
            warn!(job_id = %job.id, attempt = job.attempts, error = %e, "Scan job failed");
            record_failure(shared, &job, &e.to_string()).await;
        }
    }
}

/// Hands a failed attempt back to the queue for retry or dead-lettering.
/// If that write fails too, the job stays active until stall recovery.
async fn record_failure(shared: &Arc<Shared>, job: &QueuedJob, reason: &str) {
    let queue = &shared.worker.context().queue;

    match queue.fail(&job.id, reason).await {
        Ok(FailOutcome::Retry { attempt, delay }) => {
            info!(job_id = %job.id, attempt, delay = ?delay, "Job scheduled for retry");
            let mut state = shared.stats.lock().await;
            state.stats.jobs_failed += 1;
            state.stats.jobs_retried += 1;
        }
        Ok(FailOutcome::DeadLettered(entry)) => {
            error!(
                job_id = %entry.job_id,
                attempts = entry.attempts,
                reason = %entry.reason,
                "Job moved to dead-letter queue"
            );
            {
                let mut state = shared.stats.lock().await;
                state.stats.jobs_failed += 1;
                state.stats.jobs_dead_lettered += 1;
            }
            shared
                .worker
                .context()
                .reporter
                .report_async(FailureReport::from_dead_letter(REPORT_COMPONENT, &entry));
        }
        Err(e) => {
            error!(job_id = %job.id, error = %e, "Failed to record job failure");
        }
    }
}

/// Runs the job on its own task so a timeout or panic only affects this job.
async fn execute(shared: &Arc<Shared>, job: &QueuedJob) -> Result<ScanJobResult, ScanError> {
    let timeout = shared.options.job_timeout;
    let task_shared = shared.clone();
    let task_job = job.clone();

    let handle = tokio::spawn(async move { task_shared.worker.process(&task_job).await });
    let abort = handle.abort_handle();

    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(ScanError::Panicked(join_error.to_string())),
        Err(_) => {
            abort.abort();
            Err(ScanError::Timeout(timeout))
        }
    }
}

async fn run_maintenance(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let queue = shared.worker.context().queue.clone();
    let stall_after = shared.options.job_timeout.saturating_add(STALL_GRACE);
    let mut ticker = tokio::time::interval(shared.options.maintenance_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        // Jobs still active past the timeout lost their worker.
        if let Err(e) = queue.recover_stalled(stall_after).await {
            warn!(error = %e, "Failed to recover stalled jobs");
        }

        match queue.promote_due_repeatables().await {
            Ok(0) => {}
            Ok(promoted) => debug!(promoted, "Scheduled scans enqueued"),
            Err(e) => warn!(error = %e, "Failed to promote scheduled scans"),
        }

        match queue.cleanup(shared.options.retention).await {
            Ok(0) => {}
            Ok(removed) => debug!(removed, "Old jobs removed"),
            Err(e) => warn!(error = %e, "Failed to clean up jobs"),
        }

        match queue.depth().await {
            Ok(depth) => {
                shared.pending.store(depth.pending(), Ordering::Relaxed);
                debug!(
                    waiting = depth.waiting,
                    delayed = depth.delayed,
                    active = depth.active,
                    "Queue depth"
                );
            }
            Err(e) => warn!(error = %e, "Failed to read queue depth"),
        }
    }
}
