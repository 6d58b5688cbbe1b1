//! Worker registry rollups against a real Postgres.

mod common;

use automation_core::kernel::{WorkerRegistry, WorkerStatus};
use common::{unique_id, SharedTestInfra};

#[tokio::test]
async fn register_heartbeat_and_list() {
    let infra = SharedTestInfra::get().await;
    let pool = infra.pg_pool().await;
    let worker_id = unique_id("worker");
    let registry = WorkerRegistry::new(pool.clone(), worker_id.clone(), 7);

    registry.register().await.unwrap();
    let workers = WorkerRegistry::list_workers(&pool).await.unwrap();
    let me = workers.iter().find(|w| w.worker_id == worker_id).unwrap();
    assert_eq!(me.status, WorkerStatus::Starting);
    assert_eq!(me.max_concurrent_jobs, 7);
    assert_eq!(me.current_jobs, 0);

    registry.heartbeat(3).await.unwrap();
    let workers = WorkerRegistry::list_workers(&pool).await.unwrap();
    let me = workers.iter().find(|w| w.worker_id == worker_id).unwrap();
    assert_eq!(me.status, WorkerStatus::Running);
    assert_eq!(me.current_jobs, 3);
    assert!(!me.is_stale(chrono::Duration::seconds(60)));
}

#[tokio::test]
async fn counters_split_successes_and_failures() {
    let infra = SharedTestInfra::get().await;
    let pool = infra.pg_pool().await;
    let worker_id = unique_id("worker");
    let registry = WorkerRegistry::new(pool.clone(), worker_id.clone(), 5);
    registry.register().await.unwrap();

    registry.increment_processed(true).await.unwrap();
    registry.increment_processed(true).await.unwrap();
    registry.increment_processed(false).await.unwrap();

    let workers = WorkerRegistry::list_workers(&pool).await.unwrap();
    let me = workers.iter().find(|w| w.worker_id == worker_id).unwrap();
    assert_eq!(me.jobs_processed, 3);
    assert_eq!(me.jobs_succeeded, 2);
    assert_eq!(me.jobs_failed, 1);
}

#[tokio::test]
async fn reregistering_resets_run_counters() {
    let infra = SharedTestInfra::get().await;
    let pool = infra.pg_pool().await;
    let worker_id = unique_id("worker");
    let registry = WorkerRegistry::new(pool.clone(), worker_id.clone(), 5);

    registry.register().await.unwrap();
    registry.increment_processed(true).await.unwrap();
    registry.set_status(WorkerStatus::Stopped).await.unwrap();

    // a restarted process comes back clean
    registry.register().await.unwrap();
    let workers = WorkerRegistry::list_workers(&pool).await.unwrap();
    let me = workers.iter().find(|w| w.worker_id == worker_id).unwrap();
    assert_eq!(me.status, WorkerStatus::Starting);
    assert_eq!(me.jobs_processed, 0);
}

#[tokio::test]
async fn listing_is_newest_first() {
    let infra = SharedTestInfra::get().await;
    let pool = infra.pg_pool().await;

    let older = unique_id("worker");
    WorkerRegistry::new(pool.clone(), older.clone(), 5)
        .register()
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let newer = unique_id("worker");
    WorkerRegistry::new(pool.clone(), newer.clone(), 5)
        .register()
        .await
        .unwrap();

    let workers = WorkerRegistry::list_workers(&pool).await.unwrap();
    let older_pos = workers.iter().position(|w| w.worker_id == older).unwrap();
    let newer_pos = workers.iter().position(|w| w.worker_id == newer).unwrap();
    assert!(newer_pos < older_pos);
}
