//! SQLite implementation of the job queue.
//!
//! Times are stored as Unix milliseconds so run times and backoff can be
//! computed inside single UPDATE statements.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{
    DeadLetterEntry, FailOutcome, JobState, QueueDepth, QueueName, QueuedJob, RetryPolicy,
};
use super::{
    QueueError, Result, CANCELLED_REASON, ESTIMATED_SCAN_SECONDS, MIN_SCHEDULE_INTERVAL_SECONDS,
    SCHEDULED_JOB_KEY,
};
use crate::config::QueueConfig;
use crate::domain::{ScanJobPayload, ScanJobRequest, ScanJobResponse, ScanJobResult};

const JOB_NAME: &str = "scan";

const JOB_COLUMNS: &str = "id, queue, payload, state, attempts, max_attempts, run_at, \
     created_at, started_at, finished_at, result, failed_reason";

/// JobQueue stores scan jobs and the recurring scan registration.
pub struct JobQueue {
    pool: Pool<Sqlite>,
    retry: RetryPolicy,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

fn from_ms(ms: i64, column: &str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| QueueError::InvalidData(format!("Invalid {}: {}", column, ms)))
}

impl JobQueue {
    /// Opens the queue database described by the configuration.
    pub async fn open(config: &QueueConfig) -> Result<Self> {
        let retry = RetryPolicy {
            max_attempts: config.retry.max_attempts.max(1),
            initial_backoff: config.retry.initial_delay,
        };
        Self::open_path(&config.path, retry).await
    }

    /// Opens (and creates if needed) a queue database at `path`.
    pub async fn open_path(path: &str, retry: RetryPolicy) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let queue = Self { pool, retry };
        queue.migrate().await?;

        info!(path = %path, max_attempts = retry.max_attempts, "Job queue initialized");
        Ok(queue)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                queue TEXT NOT NULL,
                name TEXT NOT NULL,
                payload TEXT NOT NULL,
                state TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                max_attempts INTEGER NOT NULL,
                backoff_ms INTEGER NOT NULL,
                run_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                started_at INTEGER,
                finished_at INTEGER,
                result TEXT,
                failed_reason TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs(queue, state, run_at)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS repeatable_jobs (
                key TEXT PRIMARY KEY,
                queue TEXT NOT NULL,
                name TEXT NOT NULL,
                every_ms INTEGER NOT NULL,
                next_run_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dead_letters (
                job_id TEXT PRIMARY KEY,
                source_queue TEXT NOT NULL,
                payload TEXT NOT NULL,
                reason TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                failed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Validates the request and queues a manual scan.
    pub async fn enqueue_manual(&self, request: &ScanJobRequest) -> Result<ScanJobResponse> {
        request.validate()?;

        let id = format!("scan-{}", Uuid::new_v4());
        let payload = ScanJobPayload::manual(request);
        self.insert_job(&id, QueueName::Manual, &payload).await?;

        info!(
            job_id = %id,
            pair_id = ?request.pair_id,
            force = request.force,
            "Manual scan queued"
        );

        Ok(ScanJobResponse {
            job_id: id,
            status: JobState::Waiting.status(),
            queued_at: payload.requested_at,
            completed_at: None,
            estimated_duration: Some(ESTIMATED_SCAN_SECONDS),
        })
    }

    async fn insert_job(&self, id: &str, queue: QueueName, payload: &ScanJobPayload) -> Result<bool> {
        let created_at = payload.requested_at.timestamp_millis();

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO jobs (
                id, queue, name, payload, state, attempts, max_attempts, backoff_ms, run_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, 'waiting', 0, ?5, ?6, ?7, ?7)
            "#,
        )
        .bind(id)
        .bind(queue.as_str())
        .bind(JOB_NAME)
        .bind(serde_json::to_string(payload)?)
        .bind(i64::from(self.retry.max_attempts))
        .bind(duration_ms(self.retry.initial_backoff))
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Loads a job by ID.
    pub async fn get_job(&self, id: &str) -> Result<Option<QueuedJob>> {
        let row = sqlx::query(&format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(parse_job_row).transpose()
    }

    /// Externally visible status of a job, None if unknown.
    pub async fn get_status(&self, id: &str) -> Result<Option<ScanJobResponse>> {
        let Some(job) = self.get_job(id).await? else {
            return Ok(None);
        };

        Ok(Some(ScanJobResponse {
            job_id: job.id,
            status: job.state.status(),
            queued_at: job.created_at,
            completed_at: job.finished_at.filter(|_| job.state.is_finished()),
            estimated_duration: None,
        }))
    }

    /// Cancels a job that no worker has claimed yet.
    /// Returns false once the job is active or finished.
    pub async fn cancel(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE jobs SET state = 'failed', failed_reason = ?1, finished_at = ?2
            WHERE id = ?3 AND state IN ('waiting', 'delayed')
            "#,
        )
        .bind(CANCELLED_REASON)
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;

        let cancelled = result.rows_affected() == 1;
        if cancelled {
            info!(job_id = %id, "Job cancelled");
        }
        Ok(cancelled)
    }

    /// Atomically moves the oldest due job of `queue` to active.
    pub async fn claim(&self, queue: QueueName) -> Result<Option<QueuedJob>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE jobs SET state = 'active', attempts = attempts + 1, started_at = ?1
            WHERE id = (
                SELECT id FROM jobs
                WHERE queue = ?2 AND state IN ('waiting', 'delayed') AND run_at <= ?1
                ORDER BY run_at, created_at
                LIMIT 1
            ) AND state IN ('waiting', 'delayed')
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(now_ms())
        .bind(queue.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let job = row.as_ref().map(parse_job_row).transpose()?;
        if let Some(ref job) = job {
            debug!(job_id = %job.id, queue = %queue, attempt = job.attempts, "Job claimed");
        }
        Ok(job)
    }

    /// Claims from the manual queue first, then the scheduled one.
    pub async fn claim_next(&self) -> Result<Option<QueuedJob>> {
        for queue in QueueName::WORK {
            if let Some(job) = self.claim(queue).await? {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    /// Marks an active job as completed with its result.
    pub async fn complete(&self, id: &str, result: &ScanJobResult) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE jobs SET state = 'completed', result = ?1, finished_at = ?2
            WHERE id = ?3 AND state = 'active'
            "#,
        )
        .bind(serde_json::to_string(result)?)
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(QueueError::InvalidState {
                id: id.to_string(),
                expected: "active",
            });
        }
        Ok(())
    }

    /// Records a failed attempt.
    ///
    /// While attempts remain the job is delayed by the exponential backoff;
    /// otherwise it is marked failed and copied to the dead-letter table in
    /// the same transaction.
    pub async fn fail(&self, id: &str, reason: &str) -> Result<FailOutcome> {
        let now = now_ms();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            UPDATE jobs SET
                state = CASE WHEN attempts < max_attempts THEN 'delayed' ELSE 'failed' END,
                run_at = CASE WHEN attempts < max_attempts
                    THEN ?1 + backoff_ms * (1 << MIN(attempts - 1, 20))
                    ELSE run_at END,
                finished_at = CASE WHEN attempts < max_attempts THEN NULL ELSE ?1 END,
                failed_reason = ?2
            WHERE id = ?3 AND state = 'active'
            RETURNING queue, payload, state, attempts, run_at
            "#,
        )
        .bind(now)
        .bind(reason)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(QueueError::InvalidState {
                id: id.to_string(),
                expected: "active",
            });
        };

        let state = parse_state(&row)?;
        let attempts = parse_u32(&row, "attempts")?;

        if state == JobState::Delayed {
            tx.commit().await?;

            let run_at: i64 = row.try_get("run_at")?;
            let delay = Duration::from_millis(u64::try_from(run_at - now).unwrap_or(0));
            warn!(job_id = %id, attempt = attempts, delay_ms = run_at - now, reason = %reason, "Job failed, retrying");
            return Ok(FailOutcome::Retry {
                attempt: attempts,
                delay,
            });
        }

        let payload_json: String = row.try_get("payload")?;
        let entry = DeadLetterEntry {
            job_id: id.to_string(),
            payload: serde_json::from_str(&payload_json)?,
            failed_at: from_ms(now, "failed_at")?,
            reason: reason.to_string(),
            attempts,
            source_queue: parse_queue(&row)?,
        };

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO dead_letters (job_id, source_queue, payload, reason, attempts, failed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&entry.job_id)
        .bind(entry.source_queue.as_str())
        .bind(&payload_json)
        .bind(&entry.reason)
        .bind(i64::from(entry.attempts))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        warn!(
            job_id = %id,
            attempts,
            queue = %QueueName::DeadLetter,
            reason = %reason,
            "Job exhausted retries, moved to dead-letter queue"
        );
        Ok(FailOutcome::DeadLettered(entry))
    }

    /// Keeps exactly one recurring scan registration at the given interval.
    ///
    /// The interval is floored at 15 seconds. Returns true when the
    /// registration was created or replaced, false when it already matched.
    pub async fn ensure_scheduled(&self, interval_seconds: u64) -> Result<bool> {
        let every = Duration::from_secs(interval_seconds.max(MIN_SCHEDULE_INTERVAL_SECONDS));
        let every_ms = duration_ms(every);
        let now = now_ms();

        let result = sqlx::query(
            r#"
            INSERT INTO repeatable_jobs (key, queue, name, every_ms, next_run_at, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(key) DO UPDATE SET
                every_ms = excluded.every_ms,
                next_run_at = excluded.next_run_at,
                created_at = excluded.created_at
            WHERE repeatable_jobs.every_ms != excluded.every_ms
            "#,
        )
        .bind(SCHEDULED_JOB_KEY)
        .bind(QueueName::Scheduled.as_str())
        .bind(JOB_NAME)
        .bind(every_ms)
        .bind(now + every_ms)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let changed = result.rows_affected() > 0;
        if changed {
            info!(
                key = SCHEDULED_JOB_KEY,
                interval_secs = every.as_secs(),
                "Scheduled scan registered"
            );
        }
        Ok(changed)
    }

    /// Interval of the recurring scan, if registered.
    pub async fn scheduled_interval(&self) -> Result<Option<Duration>> {
        let row = sqlx::query("SELECT every_ms FROM repeatable_jobs WHERE key = ?")
            .bind(SCHEDULED_JOB_KEY)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<Duration> {
            let every_ms: i64 = row.try_get("every_ms")?;
            Ok(Duration::from_millis(u64::try_from(every_ms).unwrap_or(0)))
        })
        .transpose()
    }

    /// Enqueues one job per due registration and advances its next run.
    ///
    /// Slots missed while the process was down collapse into a single job
    /// for the most recent slot. Returns the number of jobs enqueued.
    pub async fn promote_due_repeatables(&self) -> Result<u32> {
        let now = now_ms();
        let mut tx = self.pool.begin().await?;

        let due = sqlx::query(
            r#"
            UPDATE repeatable_jobs
            SET next_run_at = next_run_at + every_ms * ((?1 - next_run_at) / every_ms + 1)
            WHERE next_run_at <= ?1
            RETURNING key, queue, every_ms, next_run_at
            "#,
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        let mut promoted = 0;
        for row in &due {
            let key: String = row.try_get("key")?;
            let queue = parse_queue(row)?;
            let every_ms: i64 = row.try_get("every_ms")?;
            let next_run_at: i64 = row.try_get("next_run_at")?;
            let slot = next_run_at - every_ms;

            let payload = ScanJobPayload::scheduled(from_ms(slot, "next_run_at")?);
            let id = format!("{}:{}", key, slot);

            let inserted = sqlx::query(
                r#"
                INSERT OR IGNORE INTO jobs (
                    id, queue, name, payload, state, attempts, max_attempts, backoff_ms, run_at, created_at
                ) VALUES (?1, ?2, ?3, ?4, 'waiting', 0, ?5, ?6, ?7, ?7)
                "#,
            )
            .bind(&id)
            .bind(queue.as_str())
            .bind(JOB_NAME)
            .bind(serde_json::to_string(&payload)?)
            .bind(i64::from(self.retry.max_attempts))
            .bind(duration_ms(self.retry.initial_backoff))
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() > 0 {
                promoted += 1;
                debug!(job_id = %id, "Scheduled scan queued");
            }
        }

        tx.commit().await?;
        Ok(promoted)
    }

    /// Deletes completed and failed jobs that finished before
    /// `now - retention`. Dead-letter entries are kept.
    pub async fn cleanup(&self, retention: Duration) -> Result<u64> {
        let cutoff = now_ms() - duration_ms(retention);

        let result = sqlx::query(
            "DELETE FROM jobs WHERE state IN ('completed', 'failed') AND finished_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            debug!(removed, "Old jobs pruned");
        }
        Ok(removed)
    }

    /// Job counts per state.
    pub async fn depth(&self) -> Result<QueueDepth> {
        let rows = sqlx::query("SELECT state, COUNT(*) AS count FROM jobs GROUP BY state")
            .fetch_all(&self.pool)
            .await?;

        let mut depth = QueueDepth::default();
        for row in &rows {
            let count: i64 = row.try_get("count")?;
            let count = u64::try_from(count).unwrap_or(0);
            match parse_state(row)? {
                JobState::Waiting => depth.waiting = count,
                JobState::Delayed => depth.delayed = count,
                JobState::Active => depth.active = count,
                JobState::Completed => depth.completed = count,
                JobState::Failed => depth.failed = count,
            }
        }
        Ok(depth)
    }

    /// Returns active jobs started before `now - timeout` to the waiting
    /// state, e.g. after a crash left them orphaned.
    pub async fn recover_stalled(&self, timeout: Duration) -> Result<u64> {
        let cutoff = now_ms() - duration_ms(timeout);

        let result = sqlx::query(
            "UPDATE jobs SET state = 'waiting', started_at = NULL WHERE state = 'active' AND started_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let recovered = result.rows_affected();
        if recovered > 0 {
            warn!(recovered, "Stalled jobs returned to the queue");
        }
        Ok(recovered)
    }

    /// Dead-letter entries, oldest first.
    pub async fn dead_letters(&self) -> Result<Vec<DeadLetterEntry>> {
        let rows = sqlx::query(
            "SELECT job_id, source_queue, payload, reason, attempts, failed_at FROM dead_letters ORDER BY failed_at, job_id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<DeadLetterEntry> {
                let payload: String = row.try_get("payload")?;
                let source_queue: String = row.try_get("source_queue")?;
                Ok(DeadLetterEntry {
                    job_id: row.try_get("job_id")?,
                    payload: serde_json::from_str(&payload)?,
                    failed_at: from_ms(row.try_get("failed_at")?, "failed_at")?,
                    reason: row.try_get("reason")?,
                    attempts: parse_u32(row, "attempts")?,
                    source_queue: QueueName::from_str(&source_queue)
                        .map_err(QueueError::InvalidData)?,
                })
            })
            .collect()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    #[cfg(test)]
    pub(crate) async fn make_repeatables_due(&self) -> Result<()> {
        sqlx::query("UPDATE repeatable_jobs SET next_run_at = ?")
            .bind(now_ms() - 1)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn parse_state(row: &SqliteRow) -> Result<JobState> {
    let raw: String = row.try_get("state")?;
    JobState::from_str(&raw).map_err(QueueError::InvalidData)
}

fn parse_queue(row: &SqliteRow) -> Result<QueueName> {
    let raw: String = row.try_get("queue")?;
    QueueName::from_str(&raw).map_err(QueueError::InvalidData)
}

fn parse_u32(row: &SqliteRow, column: &str) -> Result<u32> {
    let raw: i64 = row.try_get(column)?;
    u32::try_from(raw).map_err(|_| QueueError::InvalidData(format!("Invalid {}: {}", column, raw)))
}

fn parse_optional_ms(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<i64> = row.try_get(column)?;
    raw.map(|ms| from_ms(ms, column)).transpose()
}

/// Parses a job from a database row.
fn parse_job_row(row: &SqliteRow) -> Result<QueuedJob> {
    let payload: String = row.try_get("payload")?;
    let result: Option<String> = row.try_get("result")?;

    Ok(QueuedJob {
        id: row.try_get("id")?,
        queue: parse_queue(row)?,
        payload: serde_json::from_str(&payload)?,
        state: parse_state(row)?,
        attempts: parse_u32(row, "attempts")?,
        max_attempts: parse_u32(row, "max_attempts")?,
        run_at: from_ms(row.try_get("run_at")?, "run_at")?,
        created_at: from_ms(row.try_get("created_at")?, "created_at")?,
        started_at: parse_optional_ms(row, "started_at")?,
        finished_at: parse_optional_ms(row, "finished_at")?,
        result: result.map(|raw| serde_json::from_str(&raw)).transpose()?,
        failed_reason: row.try_get("failed_reason")?,
    })
}
