//! The engine's lifecycle, worker loops, and rule pipeline.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use openweather::CurrentWeather;
use rand::Rng;
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::actions::{dispatch_targets, ActionContext};
use super::error::{retry_delay_ms, EngineError};
use crate::domains::rules::{conditions, ActionResult, ExecutionMetrics, Rule, RuleExecution};
use crate::kernel::rate_limiter::{ServiceUsage, SERVICE_WEATHER};
use crate::kernel::{
    epoch_ms, ApiError, BackoffConfig, ClaimOutcome, EngineKernel, Job, JobResult, JobScheduler,
    JobStats, RateLimiter, WorkerRecord, WorkerRegistry, WorkerStatus,
};

/// How often the processing loop polls for ready jobs.
const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Ready jobs fetched per poll.
const READY_BATCH: usize = 5;
/// Recovery sweep cadence, after a startup grace period.
const RECOVERY_INTERVAL: Duration = Duration::from_secs(5 * 60);
const RECOVERY_GRACE: Duration = Duration::from_secs(60);
/// Chance per poll cycle of logging a queue stats snapshot.
const STATS_SNAPSHOT_PROBABILITY: f64 = 0.1;
/// How long stop() waits for in-flight jobs before giving up.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);
/// Weather fetch attempts per execution.
const WEATHER_MAX_RETRIES: u32 = 3;

/// Combined stats surface for dashboards and the CLI.
#[derive(Debug, Serialize)]
pub struct EngineStats {
    pub jobs: JobStats,
    pub rate_limits: Vec<ServiceUsage>,
    pub workers: Vec<WorkerRecord>,
    pub timestamp: DateTime<Utc>,
}

/// One worker instance of the automation engine.
///
/// Multiple engines may run against the same stores; the scheduler's
/// atomic claim keeps each rule on at most one worker at a time.
pub struct AutomationEngine {
    kernel: Arc<EngineKernel>,
    scheduler: JobScheduler,
    rate_limiter: RateLimiter,
    registry: WorkerRegistry,
    backoff: BackoffConfig,
    job_slots: Arc<Semaphore>,
    current_jobs: Arc<AtomicUsize>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AutomationEngine {
    pub fn new(kernel: EngineKernel) -> Arc<Self> {
        Self::with_worker_id(kernel, WorkerRegistry::local_worker_id())
    }

    /// Build an engine with an explicit worker id (tests run several
    /// workers in one process).
    pub fn with_worker_id(kernel: EngineKernel, worker_id: String) -> Arc<Self> {
        let max_concurrent_jobs = kernel.config.worker_max_concurrent_jobs;
        let scheduler = JobScheduler::new(kernel.redis.clone());
        let rate_limiter = RateLimiter::new(kernel.redis.clone());
        let registry = WorkerRegistry::new(
            kernel.db_pool.clone(),
            worker_id,
            max_concurrent_jobs as i32,
        );

        Arc::new(Self {
            kernel: Arc::new(kernel),
            scheduler,
            rate_limiter,
            registry,
            backoff: BackoffConfig::default(),
            job_slots: Arc::new(Semaphore::new(max_concurrent_jobs)),
            current_jobs: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn kernel(&self) -> &EngineKernel {
        &self.kernel
    }

    pub fn worker_id(&self) -> &str {
        self.registry.worker_id()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Register the worker, schedule every active rule, and launch the
    /// processing, recovery, and heartbeat loops.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        self.registry.register().await?;
        self.registry.set_status(WorkerStatus::Running).await?;

        let scheduled = self.schedule_active_rules().await?;
        info!(
            worker_id = %self.worker_id(),
            rules_scheduled = scheduled,
            "automation engine started"
        );

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(Arc::clone(&self).processing_loop()));
        tasks.push(tokio::spawn(Arc::clone(&self).recovery_loop()));
        tasks.push(tokio::spawn(Arc::clone(&self).heartbeat_loop()));
        Ok(())
    }

    /// Cooperative shutdown: stop polling, let in-flight jobs finish
    /// (bounded), then mark the worker stopped. Anything still running at
    /// the deadline is left for the recovery sweep to reschedule.
    pub async fn stop(&self) -> Result<()> {
        info!(worker_id = %self.worker_id(), "stopping automation engine");
        if let Err(e) = self.registry.set_status(WorkerStatus::Stopping).await {
            warn!(error = %e, "failed to mark worker stopping");
        }

        self.shutdown.cancel();
        for task in self.tasks.lock().await.drain(..) {
            let _ = task.await;
        }

        let deadline = Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
        while self.current_jobs.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let leftover = self.current_jobs.load(Ordering::SeqCst);
        if leftover > 0 {
            warn!(
                count = leftover,
                "shutdown drain timed out; stuck-job recovery will reschedule"
            );
        }

        self.registry.set_status(WorkerStatus::Stopped).await?;
        info!(worker_id = %self.worker_id(), "automation engine stopped");
        Ok(())
    }

    /// Schedule a check job for every active rule. A rule that was checked
    /// recently keeps its cadence; one that is overdue runs now.
    async fn schedule_active_rules(&self) -> Result<usize> {
        let rules = Rule::find_active(&self.kernel.db_pool).await?;
        let now = epoch_ms();
        let count = rules.len();

        for rule in rules {
            let interval_ms = rule.check_interval_minutes as i64 * 60_000;
            let due = rule
                .last_checked_at
                .map(|t| t.timestamp_millis() + interval_ms)
                .unwrap_or(now)
                .max(now);
            let job = Job::rule_check(
                &rule.id,
                &rule.user_id,
                rule.check_interval_minutes as u32,
            )
            .with_scheduled_at(due);
            self.scheduler.schedule(&job).await?;
        }
        Ok(count)
    }

    // ========================================================================
    // Worker loops
    // ========================================================================

    async fn processing_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }

            if let Err(e) = Self::poll_once(&self).await {
                // Coordination store down: no progress, but no crash either
                error!(error = %e, "scheduler poll failed");
            }

            if rand::thread_rng().gen::<f64>() < STATS_SNAPSHOT_PROBABILITY {
                match self.scheduler.stats().await {
                    Ok(stats) => info!(
                        scheduled = stats.scheduled,
                        processing = stats.processing,
                        overdue = stats.overdue,
                        "job queue stats"
                    ),
                    Err(e) => warn!(error = %e, "failed to read job stats"),
                }
            }
        }
        debug!("processing loop stopped");
    }

    async fn poll_once(engine: &Arc<Self>) -> Result<()> {
        let ready = engine.scheduler.ready_jobs(READY_BATCH).await?;
        for job in ready {
            let Ok(permit) = Arc::clone(&engine.job_slots).try_acquire_owned() else {
                // At capacity; leave the rest for the next cycle
                break;
            };

            match engine.scheduler.claim(&job.id).await? {
                ClaimOutcome::LostRace => {
                    debug!(job_id = %job.id, "lost claim race");
                    drop(permit);
                }
                ClaimOutcome::Claimed => {
                    let worker = Arc::clone(engine);
                    engine.current_jobs.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(async move {
                        worker.process_job(job).await;
                        worker.current_jobs.fetch_sub(1, Ordering::SeqCst);
                        drop(permit);
                    });
                }
            }
        }
        Ok(())
    }

    async fn recovery_loop(self: Arc<Self>) {
        tokio::select! {
            _ = self.shutdown.cancelled() => return,
            _ = tokio::time::sleep(RECOVERY_GRACE) => {}
        }

        loop {
            match self.scheduler.recover_stuck().await {
                Ok(recovered) if !recovered.is_empty() => {
                    warn!(count = recovered.len(), "recovered stuck jobs");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "stuck job recovery failed"),
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(RECOVERY_INTERVAL) => {}
            }
        }
        debug!("recovery loop stopped");
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let interval = Duration::from_millis(self.kernel.config.worker_heartbeat_ms);
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            let current = self.current_jobs.load(Ordering::SeqCst) as i32;
            if let Err(e) = self.registry.heartbeat(current).await {
                warn!(worker_id = %self.worker_id(), error = %e, "heartbeat failed");
            }
        }
        debug!("heartbeat loop stopped");
    }

    // ========================================================================
    // Job processing
    // ========================================================================

    /// Process one claimed job and report the outcome to the scheduler.
    /// No error escapes: every failure path becomes a job result.
    pub async fn process_job(&self, job: Job) {
        debug!(job_id = %job.id, rule_id = %job.rule_id, "processing job");

        let result = match self.process_rule(&job.rule_id).await {
            Ok(Some(record)) if record.success => JobResult::success(),
            Ok(Some(record)) => {
                // Actions failed; retry the tick on the budgeted ladder
                let message = record
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "action dispatch failed".to_string());
                let delay = retry_delay_ms(&message, job.retry_count);
                JobResult::failure(message, Some(delay))
            }
            // Inactive rule: nothing to do until the next tick
            Ok(None) => JobResult::success(),
            Err(e) if e.is_terminal() => {
                error!(job_id = %job.id, error = %e, "job terminated");
                JobResult::fatal(e.to_string())
            }
            Err(e) => {
                let message = e.to_string();
                let delay = retry_delay_ms(&message, job.retry_count);
                error!(job_id = %job.id, error = %message, "job failed");
                JobResult::failure(message, Some(delay))
            }
        };

        if let Err(e) = self.scheduler.complete(&job.id, &result).await {
            error!(job_id = %job.id, error = %e, "failed to complete job");
        }
        if let Err(e) = self.registry.increment_processed(result.success).await {
            warn!(worker_id = %self.worker_id(), error = %e, "failed to update worker counters");
        }
    }

    /// The fetch → evaluate → act pipeline for one rule.
    ///
    /// Returns `Ok(None)` when the rule exists but is inactive. The
    /// execution record is appended before returning; a failed weather
    /// fetch is recorded with a null snapshot and then re-raised so the
    /// job retries.
    pub async fn process_rule(&self, rule_id: &str) -> Result<Option<RuleExecution>, EngineError> {
        let started = Instant::now();

        let rule = Rule::find_by_id(rule_id, &self.kernel.db_pool)
            .await?
            .ok_or_else(|| EngineError::RuleNotFound(rule_id.to_string()))?;
        if !rule.is_active {
            debug!(rule_id = %rule_id, "rule inactive, skipping");
            return Ok(None);
        }

        Rule::set_last_checked(rule_id, Utc::now(), &self.kernel.db_pool).await?;

        let weather_calls = AtomicU32::new(0);
        let meta_calls = AtomicU32::new(0);
        let google_calls = AtomicU32::new(0);

        let weather = match self.fetch_weather(&rule, &weather_calls).await {
            Ok(weather) => weather,
            Err(e) => {
                let metrics = ExecutionMetrics {
                    weather_calls: weather_calls.load(Ordering::SeqCst),
                    total_time_ms: started.elapsed().as_millis() as u64,
                    ..Default::default()
                };
                let record = RuleExecution::new(
                    rule_id,
                    None,
                    false,
                    Vec::new(),
                    false,
                    Some(e.to_string()),
                    metrics,
                );
                if let Err(write_err) = record.insert(&self.kernel.db_pool).await {
                    warn!(rule_id = %rule_id, error = %write_err, "failed to record failed execution");
                }
                return Err(e.into());
            }
        };

        let conditions_met = conditions::evaluate_rule(&rule, &weather);

        let mut actions: Vec<ActionResult> = Vec::new();
        if conditions_met {
            let ctx = ActionContext {
                kernel: &self.kernel,
                rate_limiter: &self.rate_limiter,
                backoff: &self.backoff,
                meta_calls: &meta_calls,
                google_calls: &google_calls,
            };
            actions = dispatch_targets(&ctx, &rule.user_id, &rule.campaigns).await;
        }

        let execution_success = actions.iter().all(|a| a.success);
        if conditions_met && execution_success {
            Rule::set_last_executed(rule_id, Utc::now(), &self.kernel.db_pool).await?;
        }

        let success = !conditions_met || execution_success;
        let error_message = actions
            .iter()
            .find(|a| !a.success)
            .and_then(|a| a.error_message.clone());
        let metrics = ExecutionMetrics {
            weather_calls: weather_calls.load(Ordering::SeqCst),
            meta_api_calls: meta_calls.load(Ordering::SeqCst),
            google_api_calls: google_calls.load(Ordering::SeqCst),
            total_time_ms: started.elapsed().as_millis() as u64,
            conditions_evaluated: conditions::conditions_evaluated(&rule),
            actions_executed: actions.len() as u32,
        };

        let record = RuleExecution::new(
            rule_id,
            Some(weather),
            conditions_met,
            actions,
            success,
            error_message,
            metrics,
        );
        // A failed insert propagates so the job retries; the tick is not
        // considered done until it is auditable.
        record.insert(&self.kernel.db_pool).await?;

        info!(
            rule_id = %rule_id,
            conditions_met,
            success,
            actions = record.actions_taken.0.len(),
            "rule processed"
        );
        Ok(Some(record))
    }

    async fn fetch_weather(
        &self,
        rule: &Rule,
        calls: &AtomicU32,
    ) -> Result<CurrentWeather, ApiError> {
        let api = &self.kernel.weather;
        self.rate_limiter
            .execute_with_backoff(
                SERVICE_WEATHER,
                "current_weather",
                WEATHER_MAX_RETRIES,
                &self.backoff,
                || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    api.current_weather(rule.lat, rule.lon)
                },
            )
            .await
    }

    // ========================================================================
    // Inbound operations (called by the CRUD collaborator and the CLI)
    // ========================================================================

    /// Idempotently (re)schedule a rule's recurring check.
    pub async fn schedule_rule_check(
        &self,
        rule_id: &str,
        user_id: &str,
        interval_minutes: u32,
    ) -> Result<()> {
        let job = Job::rule_check(rule_id, user_id, interval_minutes);
        self.scheduler.schedule(&job).await
    }

    /// Drop a rule's job and any claim on it.
    pub async fn remove_rule(&self, rule_id: &str) -> Result<()> {
        self.scheduler.remove(&Job::rule_check_id(rule_id)).await
    }

    /// Run the pipeline immediately, bypassing the scheduler. The rule's
    /// recurring job is untouched; its next tick fires on its own cadence.
    pub async fn run_rule_once(&self, rule_id: &str) -> Result<Option<RuleExecution>, EngineError> {
        self.process_rule(rule_id).await
    }

    /// Dry run: evaluate conditions on fresh weather and report what the
    /// engine would do, without touching the platforms or the rule's
    /// bookkeeping timestamps.
    pub async fn test_rule(&self, rule_id: &str) -> Result<RuleExecution, EngineError> {
        let started = Instant::now();
        let rule = Rule::find_by_id(rule_id, &self.kernel.db_pool)
            .await?
            .ok_or_else(|| EngineError::RuleNotFound(rule_id.to_string()))?;

        let weather_calls = AtomicU32::new(0);
        let weather = self.fetch_weather(&rule, &weather_calls).await?;
        let conditions_met = conditions::evaluate_rule(&rule, &weather);

        let actions: Vec<ActionResult> = rule
            .campaigns
            .iter()
            .map(|target| ActionResult {
                campaign_id: target.campaign_id.clone(),
                platform: target.platform,
                action: target.action,
                success: true,
                error_message: None,
                target_type: target.target_type,
                ad_set_id: target.ad_set_id.clone(),
            })
            .collect();

        let metrics = ExecutionMetrics {
            weather_calls: weather_calls.load(Ordering::SeqCst),
            total_time_ms: started.elapsed().as_millis() as u64,
            conditions_evaluated: conditions::conditions_evaluated(&rule),
            actions_executed: actions.len() as u32,
            ..Default::default()
        };

        Ok(RuleExecution::new(
            rule_id,
            Some(weather),
            conditions_met,
            actions,
            true,
            None,
            metrics,
        ))
    }

    /// Queue depths, rate-limit windows, and worker listing in one shot.
    pub async fn get_engine_stats(&self) -> Result<EngineStats> {
        Ok(EngineStats {
            jobs: self.scheduler.stats().await?,
            rate_limits: self.rate_limiter.usage_snapshot().await,
            workers: WorkerRegistry::list_workers(&self.kernel.db_pool).await?,
            timestamp: Utc::now(),
        })
    }
}
