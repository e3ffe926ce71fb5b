//! Startup recovery behaviour.

mod common;

use std::sync::Arc;

use common::{seed_live_stream, seed_streamer, t0, test_pool};
use tokio::sync::Notify;

use streamvault::database::repositories::{
    JobRepository, RecordingRepository, SqlxJobRepository, SqlxRecordingRepository,
    SqlxStreamRepository, SqlxStreamerRepository, StreamRepository,
};
use streamvault::domain::types::RecordingStatus;
use streamvault::jobs::JobQueue;
use streamvault::recovery::RecoveryCoordinator;
use streamvault::supervisor::ProcessSupervisor;

async fn coordinator(
    pool: &sqlx::SqlitePool,
) -> (Arc<RecoveryCoordinator>, Arc<SqlxJobRepository>) {
    let job_repo = Arc::new(SqlxJobRepository::new(pool.clone()));
    let queue = JobQueue::new(job_repo.clone());
    let coordinator = RecoveryCoordinator::new(
        Arc::new(SqlxStreamerRepository::new(pool.clone())),
        Arc::new(SqlxStreamRepository::new(pool.clone())),
        Arc::new(SqlxRecordingRepository::new(pool.clone())),
        queue,
        Arc::new(ProcessSupervisor::new()),
        None,
        Arc::new(Notify::new()),
    );
    (coordinator, job_repo)
}

#[tokio::test]
async fn usable_orphan_is_completed_and_pipelined() {
    let (pool, dir) = test_pool().await;
    let streamer = seed_streamer(&pool, "dave", "444").await;
    let stream = seed_live_stream(&pool, &streamer).await;

    let recordings = SqlxRecordingRepository::new(pool.clone());
    let ts_path = dir.path().join("dave.ts");
    // 2 MiB of capture data survives the crash.
    tokio::fs::write(&ts_path, vec![0u8; 2 * 1024 * 1024])
        .await
        .unwrap();
    let recording = recordings
        .create(stream.id, t0(), &ts_path.to_string_lossy(), false)
        .await
        .unwrap();

    let (coordinator, job_repo) = coordinator(&pool).await;
    let report = coordinator.run_startup_recovery().await.unwrap();
    assert_eq!(report.recovered, 1);
    assert_eq!(report.failed, 0);

    let recovered = recordings.get(recording.id).await.unwrap();
    assert_eq!(recovered.status, RecordingStatus::Completed);
    assert!(recovered.end_time.is_some());

    // The session was closed and the pipeline DAG enqueued.
    let streams = SqlxStreamRepository::new(pool.clone());
    assert!(streams.get(stream.id).await.unwrap().ended_at.is_some());
    assert_eq!(job_repo.list_by_recording(recording.id).await.unwrap().len(), 6);
}

#[tokio::test]
async fn unusable_orphan_is_failed() {
    let (pool, dir) = test_pool().await;
    let streamer = seed_streamer(&pool, "dave", "444").await;
    let stream = seed_live_stream(&pool, &streamer).await;

    let recordings = SqlxRecordingRepository::new(pool.clone());
    let ts_path = dir.path().join("tiny.ts");
    tokio::fs::write(&ts_path, vec![0u8; 1024]).await.unwrap();
    let recording = recordings
        .create(stream.id, t0(), &ts_path.to_string_lossy(), false)
        .await
        .unwrap();

    let (coordinator, job_repo) = coordinator(&pool).await;
    let report = coordinator.run_startup_recovery().await.unwrap();
    assert_eq!(report.recovered, 0);
    assert_eq!(report.failed, 1);

    let failed = recordings.get(recording.id).await.unwrap();
    assert_eq!(failed.status, RecordingStatus::Failed);
    assert!(job_repo.list_by_recording(recording.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn recovery_with_nothing_to_do_is_clean() {
    let (pool, _dir) = test_pool().await;
    let (coordinator, _job_repo) = coordinator(&pool).await;
    let report = coordinator.run_startup_recovery().await.unwrap();
    assert_eq!(report.recovered, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(report.requeued_tasks, 0);
}
