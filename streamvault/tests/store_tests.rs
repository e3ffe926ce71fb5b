//! Stream store invariants.

mod common;

use chrono::Duration;

use common::{seed_live_stream, seed_streamer, t0, test_pool};
use streamvault::database::repositories::{
    MetadataPaths, ProcessingRepository, RecordingRepository, RecordingUpdate,
    SqlxProcessingRepository, SqlxRecordingRepository, SqlxStreamMetadataRepository,
    SqlxStreamRepository, StreamMetadataRepository, StreamRepository,
};
use streamvault::domain::types::{ProcessingStep, RecordingStatus, StepStatus};
use streamvault::Error;

#[tokio::test]
async fn find_or_create_reuses_live_stream() {
    let (pool, _dir) = test_pool().await;
    let streamer = seed_streamer(&pool, "alice", "111").await;
    let streams = SqlxStreamRepository::new(pool.clone());

    let first = seed_live_stream(&pool, &streamer).await;
    let second = streams
        .find_or_create_live_stream(streamer.id, t0(), Some("s43"), None, None, None)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    // The original session attributes win.
    assert_eq!(second.twitch_stream_id.as_deref(), Some("s42"));
}

#[tokio::test]
async fn episode_numbers_are_monotonic_per_month() {
    let (pool, _dir) = test_pool().await;
    let streamer = seed_streamer(&pool, "alice", "111").await;
    let streams = SqlxStreamRepository::new(pool.clone());

    let first = seed_live_stream(&pool, &streamer).await;
    assert_eq!(first.episode_number, 1);
    streams.end_stream(first.id, t0() + Duration::hours(1)).await.unwrap();

    let second = streams
        .find_or_create_live_stream(
            streamer.id,
            t0() + Duration::days(1),
            Some("s50"),
            None,
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(second.episode_number, 2);
    streams
        .end_stream(second.id, t0() + Duration::days(1) + Duration::hours(1))
        .await
        .unwrap();

    // A new month restarts the numbering.
    let next_month = streams
        .find_or_create_live_stream(
            streamer.id,
            t0() + Duration::days(40),
            Some("s60"),
            None,
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(next_month.episode_number, 1);

    assert_eq!(streams.episode_number(streamer.id, 2025, 1).await.unwrap(), 3);
    assert_eq!(streams.episode_number(streamer.id, 2025, 2).await.unwrap(), 2);
}

#[tokio::test]
async fn ended_at_is_write_once_and_clamped() {
    let (pool, _dir) = test_pool().await;
    let streamer = seed_streamer(&pool, "alice", "111").await;
    let streams = SqlxStreamRepository::new(pool.clone());
    let stream = seed_live_stream(&pool, &streamer).await;

    // An end time before the start clamps to the start.
    let ended = streams
        .end_stream(stream.id, t0() - Duration::minutes(5))
        .await
        .unwrap();
    assert_eq!(ended.ended_at, Some(t0()));

    // A second end with a different timestamp does not move it.
    let again = streams
        .end_stream(stream.id, t0() + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(again.ended_at, Some(t0()));
}

#[tokio::test]
async fn one_active_recording_per_stream() {
    let (pool, _dir) = test_pool().await;
    let streamer = seed_streamer(&pool, "alice", "111").await;
    let stream = seed_live_stream(&pool, &streamer).await;
    let recordings = SqlxRecordingRepository::new(pool.clone());

    let first = recordings.create(stream.id, t0(), "/rec/a.ts", false).await.unwrap();
    assert_eq!(first.status, RecordingStatus::Recording);

    let err = recordings.create(stream.id, t0(), "/rec/b.ts", false).await.unwrap_err();
    assert!(matches!(err, Error::RecordingAlreadyActive(_)));

    // Completing the first frees the slot.
    recordings
        .update(
            first.id,
            RecordingUpdate {
                status: Some(RecordingStatus::Completed),
                end_time: Some(t0() + Duration::hours(1)),
                ..RecordingUpdate::default()
            },
        )
        .await
        .unwrap();
    recordings.create(stream.id, t0(), "/rec/b.ts", false).await.unwrap();
}

#[tokio::test]
async fn terminal_recording_status_never_reverts() {
    let (pool, _dir) = test_pool().await;
    let streamer = seed_streamer(&pool, "alice", "111").await;
    let stream = seed_live_stream(&pool, &streamer).await;
    let recordings = SqlxRecordingRepository::new(pool.clone());

    let recording = recordings.create(stream.id, t0(), "/rec/a.ts", false).await.unwrap();
    recordings
        .update(
            recording.id,
            RecordingUpdate {
                status: Some(RecordingStatus::Failed),
                ..RecordingUpdate::default()
            },
        )
        .await
        .unwrap();

    let after = recordings
        .update(
            recording.id,
            RecordingUpdate {
                status: Some(RecordingStatus::Recording),
                ..RecordingUpdate::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(after.status, RecordingStatus::Failed);
}

#[tokio::test]
async fn processing_step_gate_enforces_predecessors() {
    let (pool, _dir) = test_pool().await;
    let streamer = seed_streamer(&pool, "alice", "111").await;
    let stream = seed_live_stream(&pool, &streamer).await;
    let recordings = SqlxRecordingRepository::new(pool.clone());
    let processing = SqlxProcessingRepository::new(pool.clone());

    let recording = recordings.create(stream.id, t0(), "/rec/a.ts", false).await.unwrap();
    processing.init(recording.id).await.unwrap();

    // Validation cannot run before remux completed.
    let err = processing
        .set_step(
            recording.id,
            ProcessingStep::Mp4Validation,
            StepStatus::Running,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidStateTransition { .. }));

    processing
        .set_step(recording.id, ProcessingStep::Mp4Remux, StepStatus::Running, None)
        .await
        .unwrap();
    processing
        .set_step(recording.id, ProcessingStep::Mp4Remux, StepStatus::Completed, None)
        .await
        .unwrap();
    processing
        .set_step(
            recording.id,
            ProcessingStep::Mp4Validation,
            StepStatus::Running,
            None,
        )
        .await
        .unwrap();

    // Thumbnail needs both metadata and chapters resolved.
    processing
        .set_step(
            recording.id,
            ProcessingStep::Mp4Validation,
            StepStatus::Completed,
            None,
        )
        .await
        .unwrap();
    let err = processing
        .set_step(recording.id, ProcessingStep::Thumbnail, StepStatus::Running, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidStateTransition { .. }));

    for step in [ProcessingStep::Metadata, ProcessingStep::Chapters] {
        processing
            .set_step(recording.id, step, StepStatus::Running, None)
            .await
            .unwrap();
        processing
            .set_step(recording.id, step, StepStatus::Completed, None)
            .await
            .unwrap();
    }
    processing
        .set_step(recording.id, ProcessingStep::Thumbnail, StepStatus::Running, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn metadata_upsert_merges_fields() {
    let (pool, _dir) = test_pool().await;
    let streamer = seed_streamer(&pool, "alice", "111").await;
    let stream = seed_live_stream(&pool, &streamer).await;
    let metadata = SqlxStreamMetadataRepository::new(pool.clone());

    metadata
        .upsert(
            stream.id,
            MetadataPaths {
                json_path: Some("/rec/a.info.json".to_string()),
                ..MetadataPaths::default()
            },
        )
        .await
        .unwrap();
    let merged = metadata
        .upsert(
            stream.id,
            MetadataPaths {
                thumbnail_path: Some("/rec/a-thumb.jpg".to_string()),
                metadata_embedded: Some(true),
                ..MetadataPaths::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(merged.json_path.as_deref(), Some("/rec/a.info.json"));
    assert_eq!(merged.thumbnail_path.as_deref(), Some("/rec/a-thumb.jpg"));
    assert!(merged.metadata_embedded);
}

#[tokio::test]
async fn cascade_delete_removes_children() {
    let (pool, _dir) = test_pool().await;
    let streamer = seed_streamer(&pool, "alice", "111").await;
    let stream = seed_live_stream(&pool, &streamer).await;
    let recordings = SqlxRecordingRepository::new(pool.clone());
    let streams = SqlxStreamRepository::new(pool.clone());

    let recording = recordings.create(stream.id, t0(), "/rec/a.ts", false).await.unwrap();
    streams.delete(stream.id).await.unwrap();

    let err = recordings.get(recording.id).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}
