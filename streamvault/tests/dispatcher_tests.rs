//! EventSub intake wired through the dispatcher to the lifecycle
//! actors, against a real database.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Semaphore;

use common::{seed_streamer, test_pool};
use streamvault::config::{ConfigCache, ConfigService};
use streamvault::database::repositories::{
    SettingsRepository, SqlxJobRepository, SqlxProcessingRepository, SqlxRecordingRepository,
    SqlxSettingsRepository, SqlxStreamEventRepository, SqlxStreamRepository,
    SqlxStreamerRepository, StreamRepository, StreamerRepository,
};
use streamvault::eventsub::{EventDeduplicator, EventSubDispatcher, WebhookPayload};
use streamvault::jobs::JobQueue;
use streamvault::logging::ActivityLog;
use streamvault::recorder::{RecorderContext, RecordingOrchestrator};
use streamvault::supervisor::ProcessSupervisor;
use streamvault::ws::StatusBroadcaster;

async fn dispatcher(
    pool: &sqlx::SqlitePool,
    log_dir: &std::path::Path,
) -> (EventSubDispatcher, Arc<RecordingOrchestrator>) {
    let streamer_repo = Arc::new(SqlxStreamerRepository::new(pool.clone()));
    let settings_repo = Arc::new(SqlxSettingsRepository::new(pool.clone()));
    let config = Arc::new(ConfigService::with_cache(
        settings_repo,
        streamer_repo.clone(),
        ConfigCache::new(),
    ));

    let ctx = Arc::new(RecorderContext {
        streamers: streamer_repo.clone(),
        streams: Arc::new(SqlxStreamRepository::new(pool.clone())),
        recordings: Arc::new(SqlxRecordingRepository::new(pool.clone())),
        events: Arc::new(SqlxStreamEventRepository::new(pool.clone())),
        processing: Arc::new(SqlxProcessingRepository::new(pool.clone())),
        config,
        supervisor: Arc::new(ProcessSupervisor::new()),
        queue: JobQueue::new(Arc::new(SqlxJobRepository::new(pool.clone()))),
        broadcaster: StatusBroadcaster::new(),
        activity: Arc::new(ActivityLog::disabled()),
        log_dir: log_dir.to_path_buf(),
        slots: Arc::new(Semaphore::new(8)),
    });
    let orchestrator = RecordingOrchestrator::new(ctx);
    let dispatcher = EventSubDispatcher::new(
        Arc::new(EventDeduplicator::new()),
        streamer_repo,
        orchestrator.clone(),
    );
    (dispatcher, orchestrator)
}

fn online_payload(broadcaster_id: &str) -> WebhookPayload {
    serde_json::from_value(json!({
        "subscription": {"id": "sub1", "type": "stream.online", "version": "1"},
        "event": {
            "id": "s42",
            "broadcaster_user_id": broadcaster_id,
            "broadcaster_user_login": "alice",
            "started_at": "2025-01-02T10:00:00Z"
        }
    }))
    .unwrap()
}

#[tokio::test]
async fn unknown_broadcaster_is_acked_and_dropped() {
    let (pool, dir) = test_pool().await;
    let (dispatcher, orchestrator) = dispatcher(&pool, dir.path()).await;

    dispatcher
        .dispatch("m1", online_payload("999"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(orchestrator.statuses().is_empty());
}

#[tokio::test]
async fn disabled_streamer_creates_no_recording() {
    let (pool, dir) = test_pool().await;
    let streamer = seed_streamer(&pool, "alice", "111").await;
    let streamer_repo = SqlxStreamerRepository::new(pool.clone());
    streamer_repo
        .set_recording_enabled(streamer.id, false)
        .await
        .unwrap();

    let (dispatcher, orchestrator) = dispatcher(&pool, dir.path()).await;
    dispatcher
        .dispatch("m1", online_payload("111"))
        .await
        .unwrap();
    // The duplicate delivery is dropped at the deduplicator.
    dispatcher
        .dispatch("m1", online_payload("111"))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!orchestrator.is_capturing(streamer.id));

    let streams = SqlxStreamRepository::new(pool.clone());
    assert!(streams
        .find_live_by_streamer(streamer.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn idle_channel_update_refreshes_streamer_metadata() {
    let (pool, dir) = test_pool().await;
    let streamer = seed_streamer(&pool, "alice", "111").await;

    let (dispatcher, _orchestrator) = dispatcher(&pool, dir.path()).await;
    let payload: WebhookPayload = serde_json::from_value(json!({
        "subscription": {"id": "sub2", "type": "channel.update", "version": "1"},
        "event": {
            "broadcaster_user_id": "111",
            "title": "New Title",
            "category_name": "Celeste",
            "broadcaster_language": "de"
        }
    }))
    .unwrap();
    dispatcher.dispatch("m2", payload).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let streamer_repo = SqlxStreamerRepository::new(pool.clone());
    let updated = streamer_repo.get(streamer.id).await.unwrap();
    assert_eq!(updated.title.as_deref(), Some("New Title"));
    assert_eq!(updated.category_name.as_deref(), Some("Celeste"));
    assert_eq!(updated.language.as_deref(), Some("de"));

    // No recording was created for an idle update.
    let streams = SqlxStreamRepository::new(pool.clone());
    assert!(streams
        .find_live_by_streamer(streamer.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn global_settings_row_exists_for_resolution() {
    let (pool, _dir) = test_pool().await;
    let settings = SqlxSettingsRepository::new(pool.clone());
    let global = settings.global().await.unwrap();
    assert_eq!(global.default_quality, "best");
    assert_eq!(global.max_concurrent_recordings, 8);
}
