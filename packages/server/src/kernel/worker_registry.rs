//! Worker liveness and capacity rollups in the durable store.
//!
//! The registry is advisory: it feeds dashboards and the CLI, and losing
//! it never blocks scheduling. Workers upsert themselves on startup,
//! heartbeat every few seconds, and bump counters as jobs finish. Dead
//! workers are surfaced (stale heartbeat) but never auto-evicted here.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "worker_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WorkerRecord {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub max_concurrent_jobs: i32,
    pub current_jobs: i32,
    pub jobs_processed: i64,
    pub jobs_succeeded: i64,
    pub jobs_failed: i64,
    pub updated_at: DateTime<Utc>,
}

impl WorkerRecord {
    /// Whether the worker has missed heartbeats long enough to look dead.
    pub fn is_stale(&self, threshold: Duration) -> bool {
        Utc::now() - self.last_heartbeat > threshold
    }
}

/// Handle for one worker's row in `workers_registry`.
#[derive(Clone)]
pub struct WorkerRegistry {
    pool: PgPool,
    worker_id: String,
    max_concurrent_jobs: i32,
}

impl WorkerRegistry {
    pub fn new(pool: PgPool, worker_id: String, max_concurrent_jobs: i32) -> Self {
        Self {
            pool,
            worker_id,
            max_concurrent_jobs,
        }
    }

    /// Identity for this process: `<hostname>-<pid>`.
    pub fn local_worker_id() -> String {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string());
        format!("{}-{}", host, std::process::id())
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Upsert this worker's row. A restarted process re-registers under
    /// the same id and its run counters start over.
    pub async fn register(&self) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO workers_registry (
                worker_id, status, started_at, last_heartbeat,
                max_concurrent_jobs, current_jobs,
                jobs_processed, jobs_succeeded, jobs_failed, updated_at
            )
            VALUES ($1, 'starting', NOW(), NOW(), $2, 0, 0, 0, 0, NOW())
            ON CONFLICT (worker_id) DO UPDATE
            SET status = 'starting',
                started_at = NOW(),
                last_heartbeat = NOW(),
                max_concurrent_jobs = EXCLUDED.max_concurrent_jobs,
                current_jobs = 0,
                jobs_processed = 0,
                jobs_succeeded = 0,
                jobs_failed = 0,
                updated_at = NOW()
            "#,
        )
        .bind(&self.worker_id)
        .bind(self.max_concurrent_jobs)
        .execute(&self.pool)
        .await?;

        debug!(worker_id = %self.worker_id, "registered worker");
        Ok(())
    }

    /// Refresh liveness and the in-flight gauge.
    pub async fn heartbeat(&self, current_jobs: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE workers_registry
            SET last_heartbeat = NOW(),
                current_jobs = $1,
                status = 'running',
                updated_at = NOW()
            WHERE worker_id = $2
            "#,
        )
        .bind(current_jobs)
        .bind(&self.worker_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bump the processed counter and the success/failure split atomically.
    pub async fn increment_processed(&self, success: bool) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE workers_registry
            SET jobs_processed = jobs_processed + 1,
                jobs_succeeded = jobs_succeeded + CASE WHEN $1 THEN 1 ELSE 0 END,
                jobs_failed = jobs_failed + CASE WHEN $1 THEN 0 ELSE 1 END,
                updated_at = NOW()
            WHERE worker_id = $2
            "#,
        )
        .bind(success)
        .bind(&self.worker_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_status(&self, status: WorkerStatus) -> Result<()> {
        Self::set_status_for(&self.pool, &self.worker_id, status).await
    }

    /// Status transition for an arbitrary worker id (CLI `stop-worker`).
    pub async fn set_status_for(pool: &PgPool, worker_id: &str, status: WorkerStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE workers_registry
            SET status = $1,
                updated_at = NOW()
            WHERE worker_id = $2
            "#,
        )
        .bind(status)
        .bind(worker_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// All known workers, newest first.
    pub async fn list_workers(pool: &PgPool) -> Result<Vec<WorkerRecord>> {
        let workers = sqlx::query_as::<_, WorkerRecord>(
            r#"
            SELECT *
            FROM workers_registry
            ORDER BY started_at DESC
            "#,
        )
        .fetch_all(pool)
        .await?;
        Ok(workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_worker_id_includes_pid() {
        let id = WorkerRegistry::local_worker_id();
        assert!(id.ends_with(&std::process::id().to_string()));
    }

    #[test]
    fn stale_detection() {
        let record = WorkerRecord {
            worker_id: "w".into(),
            status: WorkerStatus::Running,
            started_at: Utc::now(),
            last_heartbeat: Utc::now() - Duration::seconds(120),
            max_concurrent_jobs: 5,
            current_jobs: 0,
            jobs_processed: 0,
            jobs_succeeded: 0,
            jobs_failed: 0,
            updated_at: Utc::now(),
        };
        assert!(record.is_stale(Duration::seconds(60)));
        assert!(!record.is_stale(Duration::seconds(300)));
    }
}
