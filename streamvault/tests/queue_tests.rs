//! Job queue ordering, dependency, and recovery behaviour.

mod common;

use chrono::{Duration, Utc};
use serde_json::json;

use common::test_pool;
use std::sync::Arc;
use streamvault::database::repositories::{JobRepository, SqlxJobRepository};
use streamvault::jobs::{JobQueue, Task, TaskKind, TaskState};
use streamvault::pipeline::pipeline_tasks;
use streamvault::Error;

fn repo(pool: &sqlx::SqlitePool) -> Arc<SqlxJobRepository> {
    Arc::new(SqlxJobRepository::new(pool.clone()))
}

#[tokio::test]
async fn dag_releases_tasks_in_order() {
    let (pool, _dir) = test_pool().await;
    let queue = JobQueue::new(repo(&pool));

    queue.enqueue(pipeline_tasks(1, 1)).await.unwrap();

    // Only the remux is ready at first.
    let first = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(first.kind, TaskKind::Mp4Remux);
    assert!(queue.claim_next().await.unwrap().is_none());

    queue.complete(&first, Ok(())).await.unwrap();
    let second = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(second.kind, TaskKind::Mp4Validation);
    queue.complete(&second, Ok(())).await.unwrap();

    // Metadata and chapters become ready together.
    let third = queue.claim_next().await.unwrap().unwrap();
    let fourth = queue.claim_next().await.unwrap().unwrap();
    let mut kinds = [third.kind, fourth.kind];
    kinds.sort_by_key(|k| k.as_str().to_string());
    assert_eq!(kinds, [TaskKind::ChaptersGen, TaskKind::MetadataGen]);

    // Thumbnail waits for both.
    queue.complete(&third, Ok(())).await.unwrap();
    assert!(queue.claim_next().await.unwrap().is_none());
    queue.complete(&fourth, Ok(())).await.unwrap();
    let fifth = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(fifth.kind, TaskKind::Thumbnail);
    queue.complete(&fifth, Ok(())).await.unwrap();

    let sixth = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(sixth.kind, TaskKind::Cleanup);
    queue.complete(&sixth, Ok(())).await.unwrap();

    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.succeeded, 6);
    assert_eq!(stats.queued + stats.running + stats.failed + stats.skipped, 0);
}

#[tokio::test]
async fn ready_tasks_dequeue_by_priority_then_age() {
    let (pool, _dir) = test_pool().await;
    let queue = JobQueue::new(repo(&pool));

    let low = Task::new(TaskKind::LivePreview, json!({})).with_priority(10);
    let high = Task::new(TaskKind::Cleanup, json!({})).with_priority(50);
    queue.enqueue(vec![low, high]).await.unwrap();

    let first = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(first.kind, TaskKind::Cleanup);
    let second = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(second.kind, TaskKind::LivePreview);
}

#[tokio::test]
async fn terminal_failure_skips_dependents_transitively() {
    let (pool, _dir) = test_pool().await;
    let repo = repo(&pool);
    let queue = JobQueue::new(repo.clone());

    queue.enqueue(pipeline_tasks(1, 1)).await.unwrap();

    let remux = queue.claim_next().await.unwrap().unwrap();
    // Validation has max_attempts 1; remux has 3, so exhaust them.
    let mut task = remux;
    for _ in 0..task.max_attempts {
        queue
            .complete(&task, Err(Error::RemuxFailed("boom".to_string())))
            .await
            .unwrap();
        // Clear the backoff so the retry is immediately claimable.
        let reloaded = repo.get(&task.id).await.unwrap();
        if reloaded.state != TaskState::Queued {
            break;
        }
        repo.requeue(&task.id, Utc::now() - Duration::seconds(1), "boom")
            .await
            .unwrap();
        task = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(task.kind, TaskKind::Mp4Remux);
    }

    let failed = repo.get(&task.id).await.unwrap();
    assert_eq!(failed.state, TaskState::Failed);

    // Everything downstream is skipped with the dependency marker.
    for pending in repo.list_by_recording(1).await.unwrap() {
        if pending.id == task.id {
            continue;
        }
        assert_eq!(pending.state, TaskState::Skipped, "kind {}", pending.kind);
        assert_eq!(pending.last_error.as_deref(), Some("dependency failed"));
    }
}

#[tokio::test]
async fn retry_backoff_delays_requeue() {
    let (pool, _dir) = test_pool().await;
    let repo = repo(&pool);
    let queue = JobQueue::new(repo.clone());

    queue
        .enqueue(vec![Task::new(TaskKind::Mp4Remux, json!({}))])
        .await
        .unwrap();
    let task = queue.claim_next().await.unwrap().unwrap();
    queue
        .complete(&task, Err(Error::RemuxFailed("transient".to_string())))
        .await
        .unwrap();

    let requeued = repo.get(&task.id).await.unwrap();
    assert_eq!(requeued.state, TaskState::Queued);
    let not_before = requeued.not_before.expect("backoff deadline set");
    // Base 30 s with ±20 % jitter.
    let delay = (not_before - Utc::now()).num_seconds();
    assert!((20..=40).contains(&delay), "delay {delay}s out of window");

    // Not claimable until the deadline passes.
    assert!(queue.claim_next().await.unwrap().is_none());
}

#[tokio::test]
async fn non_retryable_error_fails_immediately() {
    let (pool, _dir) = test_pool().await;
    let repo = repo(&pool);
    let queue = JobQueue::new(repo.clone());

    queue
        .enqueue(vec![Task::new(TaskKind::MetadataGen, json!({}))])
        .await
        .unwrap();
    let task = queue.claim_next().await.unwrap().unwrap();
    queue
        .complete(
            &task,
            Err(Error::CrossStreamerPath {
                streamer: "eve".to_string(),
                path: "/recordings/frank".to_string(),
            }),
        )
        .await
        .unwrap();

    let failed = repo.get(&task.id).await.unwrap();
    assert_eq!(failed.state, TaskState::Failed);
    assert_eq!(failed.attempts, 1);
}

#[tokio::test]
async fn cancellation_skips_dependents() {
    let (pool, _dir) = test_pool().await;
    let repo = repo(&pool);
    let queue = JobQueue::new(repo.clone());

    let parent = Task::new(TaskKind::Mp4Remux, json!({}));
    let child = Task::new(TaskKind::Mp4Validation, json!({})).with_dependency(&parent.id);
    let parent_id = parent.id.clone();
    let child_id = child.id.clone();
    queue.enqueue(vec![parent, child]).await.unwrap();

    queue.cancel(&parent_id).await.unwrap();

    assert_eq!(repo.get(&parent_id).await.unwrap().state, TaskState::Cancelled);
    assert_eq!(repo.get(&child_id).await.unwrap().state, TaskState::Skipped);
    assert!(queue.claim_next().await.unwrap().is_none());
}

#[tokio::test]
async fn rehydrate_requeues_interrupted_tasks() {
    let (pool, _dir) = test_pool().await;
    let repo = repo(&pool);

    // First queue instance claims a task and then "crashes".
    {
        let queue = JobQueue::new(repo.clone());
        queue.enqueue(pipeline_tasks(1, 1)).await.unwrap();
        let running = queue.claim_next().await.unwrap().unwrap();
        assert_eq!(running.state, TaskState::Running);
    }

    // A fresh queue rehydrates and sees the same graph.
    let queue = JobQueue::new(repo.clone());
    let pending = queue.rehydrate().await.unwrap();
    assert_eq!(pending.len(), 6);
    assert!(pending.iter().all(|t| t.state == TaskState::Queued));

    // Draining after rehydration reaches the same terminal set.
    let mut succeeded = 0;
    while let Some(task) = queue.claim_next().await.unwrap() {
        queue.complete(&task, Ok(())).await.unwrap();
        succeeded += 1;
    }
    assert_eq!(succeeded, 6);
    let stats = queue.stats().await.unwrap();
    assert_eq!(stats.succeeded, 6);
}

#[tokio::test]
async fn per_kind_concurrency_cap_is_enforced() {
    let (pool, _dir) = test_pool().await;
    let queue = JobQueue::new(repo(&pool));

    let tasks: Vec<Task> = (0..3)
        .map(|i| Task::new(TaskKind::Mp4Remux, json!({ "n": i })))
        .collect();
    queue.enqueue(tasks).await.unwrap();

    // The remux cap is 2; a third claim yields nothing.
    let first = queue.claim_next().await.unwrap().unwrap();
    let second = queue.claim_next().await.unwrap().unwrap();
    assert!(queue.claim_next().await.unwrap().is_none());

    queue.complete(&first, Ok(())).await.unwrap();
    let third = queue.claim_next().await.unwrap().unwrap();
    assert_eq!(third.kind, TaskKind::Mp4Remux);
    queue.complete(&second, Ok(())).await.unwrap();
    queue.complete(&third, Ok(())).await.unwrap();
}
