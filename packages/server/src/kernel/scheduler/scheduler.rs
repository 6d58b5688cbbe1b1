//! The scheduler's Redis-side operations.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use tracing::{debug, warn};

use super::job::{Job, JobResult};
use crate::kernel::clock::epoch_ms;

const SCHEDULED_KEY: &str = "jobs:scheduled";
const PROCESSING_KEY: &str = "jobs:processing";

/// A claimed job counts as stuck after ten minutes of processing.
pub const STUCK_AFTER_MS: i64 = 10 * 60_000;
/// Scheduled jobs count as overdue five minutes past their due time.
const OVERDUE_AFTER_MS: i64 = 5 * 60_000;
/// Result ledger entries expire after 24 hours.
const RESULT_TTL_MS: i64 = 24 * 3_600_000;
/// Fallback retry ladder when the worker did not suggest a delay.
const RETRY_CAP_MS: u64 = 300_000;

fn job_key(id: &str) -> String {
    format!("job:{id}")
}

fn result_key(id: &str) -> String {
    format!("jobs:results:{id}")
}

/// Outcome of a claim attempt. Losing the race is normal under multiple
/// workers and simply means another worker owns the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    LostRace,
}

/// Queue depth snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct JobStats {
    pub scheduled: u64,
    pub processing: u64,
    pub overdue: u64,
}

/// Most recent completion for a job, read back from the result ledger.
#[derive(Debug, Clone, Serialize)]
pub struct LastResult {
    pub success: bool,
    pub error: Option<String>,
    pub completed_at: i64,
    pub retry_count: u32,
}

/// Persistent time-ordered job queue with at-most-one-in-flight claims.
#[derive(Clone)]
pub struct JobScheduler {
    redis: ConnectionManager,
}

impl JobScheduler {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Write the job record and place it in the scheduled set.
    ///
    /// Idempotent: an existing id has its due time replaced. The id is
    /// also dropped from the processing set in the same transaction, so
    /// a job can never occupy both sets.
    pub async fn schedule(&self, job: &Job) -> Result<()> {
        let data = serde_json::to_string(job).context("failed to serialize job")?;
        let mut conn = self.redis.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset(job_key(&job.id), "data", data)
            .ignore()
            .zadd(SCHEDULED_KEY, job.id.as_str(), job.scheduled_at)
            .ignore()
            .srem(PROCESSING_KEY, job.id.as_str())
            .ignore()
            .query_async(&mut conn)
            .await
            .context("failed to schedule job")?;

        debug!(
            job_id = %job.id,
            rule_id = %job.rule_id,
            scheduled_at = job.scheduled_at,
            "scheduled job"
        );
        Ok(())
    }

    /// Jobs due now, ordered by due time, then priority, then id.
    ///
    /// Records that fail to parse are purged from every key so one bad
    /// write cannot wedge the queue.
    pub async fn ready_jobs(&self, limit: usize) -> Result<Vec<Job>> {
        let now = epoch_ms();
        let mut conn = self.redis.clone();
        let ids: Vec<String> = conn
            .zrangebyscore_limit(SCHEDULED_KEY, "-inf", now, 0, limit as isize)
            .await
            .context("failed to read scheduled set")?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let raw: Option<String> = conn
                .hget(job_key(&id), "data")
                .await
                .context("failed to read job record")?;

            let parsed = raw.as_deref().map(serde_json::from_str::<Job>);
            match parsed {
                Some(Ok(job)) => jobs.push(job),
                Some(Err(e)) => {
                    warn!(job_id = %id, error = %e, "purging corrupt job record");
                    self.purge(&id).await?;
                }
                None => {
                    warn!(job_id = %id, "purging scheduled id with no record");
                    self.purge(&id).await?;
                }
            }
        }

        jobs.sort_by(|a, b| {
            a.scheduled_at
                .cmp(&b.scheduled_at)
                .then(a.priority.cmp(&b.priority))
                .then(a.id.cmp(&b.id))
        });
        Ok(jobs)
    }

    /// Atomically claim a job for execution.
    ///
    /// The ZREM from the scheduled set is the linearization point: exactly
    /// one of any number of racing workers sees the removal succeed.
    pub async fn claim(&self, id: &str) -> Result<ClaimOutcome> {
        let mut conn = self.redis.clone();
        let removed: i64 = conn
            .zrem(SCHEDULED_KEY, id)
            .await
            .context("failed to claim job")?;
        if removed == 0 {
            return Ok(ClaimOutcome::LostRace);
        }

        let _: () = redis::pipe()
            .atomic()
            .sadd(PROCESSING_KEY, id)
            .ignore()
            .hset(job_key(id), "processing_started_at", epoch_ms())
            .ignore()
            .query_async(&mut conn)
            .await
            .context("failed to mark job processing")?;
        Ok(ClaimOutcome::Claimed)
    }

    /// Record a job's outcome and decide what happens next.
    ///
    /// Success schedules the next periodic tick anchored at the completion
    /// instant. Transient failures retry on a capped exponential ladder
    /// while budget remains; a recurring job that exhausts its retries
    /// falls back to its normal cadence rather than dying. Fatal failures
    /// drop the job entirely.
    pub async fn complete(&self, id: &str, result: &JobResult) -> Result<()> {
        let now = epoch_ms();
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn
            .hget(job_key(id), "data")
            .await
            .context("failed to read job record")?;

        let job = raw.as_deref().and_then(|r| serde_json::from_str::<Job>(r).ok());
        match job {
            None => {
                // Record already removed (rule deleted mid-flight); just
                // release any membership.
                let _: () = redis::pipe()
                    .atomic()
                    .zrem(SCHEDULED_KEY, id)
                    .ignore()
                    .srem(PROCESSING_KEY, id)
                    .ignore()
                    .query_async(&mut conn)
                    .await
                    .context("failed to release removed job")?;
            }
            Some(mut job) => {
                if result.success {
                    job.retry_count = 0;
                    job.last_executed_at = Some(now);
                    job.scheduled_at = now + job.interval_ms();
                    self.reschedule(&job).await?;
                    debug!(job_id = %id, next_at = job.scheduled_at, "job succeeded, next tick scheduled");
                } else if !result.fatal && job.retry_count < job.max_retries {
                    let delay_ms = result
                        .retry_after_ms
                        .unwrap_or_else(|| default_retry_delay_ms(job.retry_count));
                    job.retry_count += 1;
                    job.scheduled_at = now + delay_ms as i64;
                    self.reschedule(&job).await?;
                    warn!(
                        job_id = %id,
                        retry_count = job.retry_count,
                        delay_ms,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "job failed, retry scheduled"
                    );
                } else if !result.fatal && job.interval_minutes > 0 {
                    // Retries exhausted on a recurring job: give up on this
                    // tick and resume the normal cadence.
                    job.retry_count = 0;
                    job.scheduled_at = now + job.interval_ms();
                    self.reschedule(&job).await?;
                    warn!(
                        job_id = %id,
                        next_at = job.scheduled_at,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "retries exhausted, resuming normal cadence"
                    );
                } else {
                    self.purge(id).await?;
                    warn!(
                        job_id = %id,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "job terminated"
                    );
                }
            }
        }

        self.write_result(id, result, now).await
    }

    async fn reschedule(&self, job: &Job) -> Result<()> {
        let data = serde_json::to_string(job).context("failed to serialize job")?;
        let mut conn = self.redis.clone();
        let _: () = redis::pipe()
            .atomic()
            .hset(job_key(&job.id), "data", data)
            .ignore()
            .hdel(job_key(&job.id), "processing_started_at")
            .ignore()
            .zadd(SCHEDULED_KEY, job.id.as_str(), job.scheduled_at)
            .ignore()
            .srem(PROCESSING_KEY, job.id.as_str())
            .ignore()
            .query_async(&mut conn)
            .await
            .context("failed to reschedule job")?;
        Ok(())
    }

    async fn write_result(&self, id: &str, result: &JobResult, completed_at: i64) -> Result<()> {
        let retry_count = self.current_retry_count(id).await;
        let mut conn = self.redis.clone();
        let key = result_key(id);
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(
                &key,
                &[
                    ("success", if result.success { "1" } else { "0" }.to_string()),
                    ("error", result.error.clone().unwrap_or_default()),
                    ("completed_at", completed_at.to_string()),
                    ("retry_count", retry_count.to_string()),
                ],
            )
            .ignore()
            .pexpire(&key, RESULT_TTL_MS)
            .ignore()
            .query_async(&mut conn)
            .await
            .context("failed to write job result")?;
        Ok(())
    }

    async fn current_retry_count(&self, id: &str) -> u32 {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.hget(job_key(id), "data").await.ok().flatten();
        raw.as_deref()
            .and_then(|r| serde_json::from_str::<Job>(r).ok())
            .map(|j| j.retry_count)
            .unwrap_or(0)
    }

    /// Most recent outcome for a job, if the 24 h ledger still has it.
    pub async fn last_result(&self, id: &str) -> Result<Option<LastResult>> {
        let mut conn = self.redis.clone();
        let fields: std::collections::HashMap<String, String> = conn
            .hgetall(result_key(id))
            .await
            .context("failed to read job result")?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(LastResult {
            success: fields.get("success").map(|v| v == "1").unwrap_or(false),
            error: fields.get("error").filter(|v| !v.is_empty()).cloned(),
            completed_at: fields
                .get("completed_at")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            retry_count: fields
                .get("retry_count")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }))
    }

    /// Delete a job and its claims entirely.
    pub async fn remove(&self, id: &str) -> Result<()> {
        self.purge(id).await?;
        debug!(job_id = %id, "removed job");
        Ok(())
    }

    async fn purge(&self, id: &str) -> Result<()> {
        let mut conn = self.redis.clone();
        let _: () = redis::pipe()
            .atomic()
            .del(job_key(id))
            .ignore()
            .zrem(SCHEDULED_KEY, id)
            .ignore()
            .srem(PROCESSING_KEY, id)
            .ignore()
            .query_async(&mut conn)
            .await
            .context("failed to purge job")?;
        Ok(())
    }

    /// Move jobs stuck in processing back to the scheduled set.
    ///
    /// Returns the recovered ids. Recovery never touches `retry_count`;
    /// a crashed worker is not the job's fault.
    pub async fn recover_stuck(&self) -> Result<Vec<String>> {
        let now = epoch_ms();
        let mut conn = self.redis.clone();
        let ids: Vec<String> = conn
            .smembers(PROCESSING_KEY)
            .await
            .context("failed to read processing set")?;

        let mut recovered = Vec::new();
        for id in ids {
            let started: Option<i64> = conn
                .hget(job_key(&id), "processing_started_at")
                .await
                .context("failed to read processing timestamp")?;
            match started {
                Some(started) if now - started >= STUCK_AFTER_MS => {
                    let _: () = redis::pipe()
                        .atomic()
                        .zadd(SCHEDULED_KEY, id.as_str(), now)
                        .ignore()
                        .srem(PROCESSING_KEY, id.as_str())
                        .ignore()
                        .hdel(job_key(&id), "processing_started_at")
                        .ignore()
                        .query_async(&mut conn)
                        .await
                        .context("failed to recover stuck job")?;
                    warn!(job_id = %id, stuck_ms = now - started, "recovered stuck job");
                    recovered.push(id);
                }
                Some(_) => {}
                None => {
                    // Claim with no record or timestamp; drop the orphan.
                    let _: i64 = conn
                        .srem(PROCESSING_KEY, &id)
                        .await
                        .context("failed to drop orphaned claim")?;
                    warn!(job_id = %id, "dropped orphaned processing claim");
                }
            }
        }
        Ok(recovered)
    }

    /// Queue depth counters.
    pub async fn stats(&self) -> Result<JobStats> {
        let now = epoch_ms();
        let mut conn = self.redis.clone();
        let (scheduled, processing, overdue): (u64, u64, u64) = redis::pipe()
            .zcard(SCHEDULED_KEY)
            .scard(PROCESSING_KEY)
            .zcount(SCHEDULED_KEY, "-inf", now - OVERDUE_AFTER_MS)
            .query_async(&mut conn)
            .await
            .context("failed to read job stats")?;
        Ok(JobStats {
            scheduled,
            processing,
            overdue,
        })
    }

    /// The soonest-due scheduled jobs, for operator listings.
    pub async fn list_scheduled(&self, limit: usize) -> Result<Vec<Job>> {
        let mut conn = self.redis.clone();
        let ids: Vec<String> = conn
            .zrange(SCHEDULED_KEY, 0, limit as isize - 1)
            .await
            .context("failed to list scheduled jobs")?;

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let raw: Option<String> = conn.hget(job_key(&id), "data").await?;
            if let Some(job) = raw.as_deref().and_then(|r| serde_json::from_str::<Job>(r).ok()) {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }
}

/// `min(2^(retry_count+1) * 1000, 300000)`: 2 s, 4 s, 8 s ... capped at 5 min.
fn default_retry_delay_ms(retry_count: u32) -> u64 {
    (2u64.saturating_pow(retry_count + 1) * 1_000).min(RETRY_CAP_MS)
}
