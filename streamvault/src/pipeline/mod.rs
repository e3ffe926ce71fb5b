//! Post-processing pipeline: the per-recording task DAG.
//!
//! Every finished recording gets the fixed DAG
//! remux → validation → {metadata, chapters} → thumbnail → cleanup,
//! executed by the job queue. Handlers are idempotent and derive all
//! paths from the stream store.

pub mod chapters;
pub mod cleanup;
pub mod ffmpeg;
pub mod metadata;
pub mod preview;
pub mod remux;
pub mod thumbnail;
pub mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ConfigResolver;
use crate::database::repositories::{
    ProcessingRepository, RecordingRepository, StreamEventRepository, StreamMetadataRepository,
    StreamRepository, StreamerRepository,
};
use crate::domain::types::{ProcessingStep, StepStatus};
use crate::domain::{Recording, Stream, Streamer};
use crate::jobs::{JobQueue, QueueEvent, Task, TaskKind, TaskState};
use crate::supervisor::ProcessSupervisor;
use crate::ws::{Envelope, StatusBroadcaster};
use crate::{Error, Result};

/// Payload shared by every pipeline task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PipelinePayload {
    pub recording_id: i64,
    pub stream_id: i64,
}

impl PipelinePayload {
    pub fn from_task(task: &Task) -> Result<Self> {
        Ok(serde_json::from_value(task.payload.clone())?)
    }
}

/// Shared dependencies of every pipeline handler.
pub struct PipelineContext {
    pub streamers: Arc<dyn StreamerRepository>,
    pub streams: Arc<dyn StreamRepository>,
    pub recordings: Arc<dyn RecordingRepository>,
    pub events: Arc<dyn StreamEventRepository>,
    pub metadata: Arc<dyn StreamMetadataRepository>,
    pub processing: Arc<dyn ProcessingRepository>,
    pub config: Arc<dyn ConfigResolver>,
    pub supervisor: Arc<ProcessSupervisor>,
    pub broadcaster: Arc<StatusBroadcaster>,
    pub activity: Arc<crate::logging::ActivityLog>,
    pub log_dir: PathBuf,
    pub http: reqwest::Client,
    /// Queue handle for follow-up work (retention deletions).
    pub queue: Arc<JobQueue>,
    /// Poked after a successful cleanup so the recovery coordinator can
    /// re-examine abandoned recordings.
    pub orphan_check: Arc<Notify>,
}

impl PipelineContext {
    /// Load the entity triple a handler works on.
    pub async fn load(&self, payload: &PipelinePayload) -> Result<(Recording, Stream, Streamer)> {
        let recording = self.recordings.get(payload.recording_id).await?;
        let stream = self.streams.get(payload.stream_id).await?;
        let streamer = self.streamers.get(stream.streamer_id).await?;
        Ok((recording, stream, streamer))
    }

    /// Transition a processing step and broadcast the delta. Failures
    /// also surface as a toast, since they are streamer-attributable.
    pub async fn set_step(
        &self,
        recording_id: i64,
        step: ProcessingStep,
        status: StepStatus,
        last_error: Option<&str>,
    ) -> Result<()> {
        let state = self
            .processing
            .set_step(recording_id, step, status, last_error)
            .await?;
        self.broadcaster.broadcast_processing_delta(
            recording_id,
            json!({
                "recording_id": recording_id,
                "step": step.as_str(),
                "status": status.as_str(),
                "last_error": state.last_error,
                "state": state,
            }),
        );
        if status == StepStatus::Failed {
            self.broadcaster.broadcast(&Envelope::toast(json!({
                "level": "error",
                "recording_id": recording_id,
                "message": format!(
                    "{} failed: {}",
                    step.as_str(),
                    last_error.unwrap_or("unknown error")
                ),
            })));
        }
        Ok(())
    }
}

/// Build the pipeline DAG for a finished recording.
pub fn pipeline_tasks(recording_id: i64, stream_id: i64) -> Vec<Task> {
    let payload = json!(PipelinePayload {
        recording_id,
        stream_id
    });

    let remux = Task::new(TaskKind::Mp4Remux, payload.clone()).with_recording(recording_id);
    let validation = Task::new(TaskKind::Mp4Validation, payload.clone())
        .with_recording(recording_id)
        .with_dependency(&remux.id);
    let metadata = Task::new(TaskKind::MetadataGen, payload.clone())
        .with_recording(recording_id)
        .with_dependency(&validation.id);
    let chapters = Task::new(TaskKind::ChaptersGen, payload.clone())
        .with_recording(recording_id)
        .with_dependency(&validation.id);
    let thumbnail = Task::new(TaskKind::Thumbnail, payload.clone())
        .with_recording(recording_id)
        .with_dependency(&metadata.id)
        .with_dependency(&chapters.id);
    let cleanup = Task::new(TaskKind::Cleanup, payload)
        .with_recording(recording_id)
        .with_dependency(&thumbnail.id);

    vec![remux, validation, metadata, chapters, thumbnail, cleanup]
}

/// Delayed live preview task scheduled when a capture starts.
pub fn live_preview_task(
    recording_id: i64,
    stream_id: i64,
    username: &str,
    not_before: DateTime<Utc>,
) -> Task {
    Task::new(
        TaskKind::LivePreview,
        json!({
            "recording_id": recording_id,
            "stream_id": stream_id,
            "username": username,
        }),
    )
    .with_recording(recording_id)
    .with_not_before(not_before)
}

/// Unconditional file removal for a deleted stream.
pub fn stream_deletion_task(stream_id: i64) -> Task {
    Task::new(TaskKind::StreamDeletion, json!({ "stream_id": stream_id }))
}

fn step_for_kind(kind: TaskKind) -> Option<ProcessingStep> {
    match kind {
        TaskKind::Mp4Remux => Some(ProcessingStep::Mp4Remux),
        TaskKind::Mp4Validation => Some(ProcessingStep::Mp4Validation),
        TaskKind::MetadataGen => Some(ProcessingStep::Metadata),
        TaskKind::ChaptersGen => Some(ProcessingStep::Chapters),
        TaskKind::Thumbnail => Some(ProcessingStep::Thumbnail),
        TaskKind::Cleanup => Some(ProcessingStep::Cleanup),
        _ => None,
    }
}

/// Mirror queue outcomes into the processing state and the fan-out.
///
/// Handlers mark their own running/completed/failed transitions, but a
/// task that is skipped or cancelled never runs, so only the queue can
/// record that outcome.
pub fn spawn_status_sync(
    queue: Arc<JobQueue>,
    processing: Arc<dyn ProcessingRepository>,
    broadcaster: Arc<StatusBroadcaster>,
    cancel_token: CancellationToken,
) {
    let mut events = queue.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel_token.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Status sync lagged behind queue events");
                        continue;
                    }
                    Err(_) => break,
                },
            };

            match event {
                QueueEvent::TaskFinished {
                    kind,
                    recording_id: Some(recording_id),
                    state,
                    last_error,
                    ..
                } => {
                    let step_status = match state {
                        TaskState::Skipped => Some(StepStatus::Skipped),
                        TaskState::Cancelled => Some(StepStatus::Skipped),
                        _ => None,
                    };
                    if let (Some(step), Some(step_status)) = (step_for_kind(kind), step_status) {
                        let result = processing
                            .set_step(recording_id, step, step_status, last_error.as_deref())
                            .await;
                        match result {
                            Ok(state) => broadcaster.broadcast_processing_delta(
                                recording_id,
                                json!({
                                    "recording_id": recording_id,
                                    "step": step.as_str(),
                                    "status": step_status.as_str(),
                                    "last_error": state.last_error,
                                    "state": state,
                                }),
                            ),
                            Err(e) => {
                                debug!(recording_id, error = %e, "Failed to sync skipped step")
                            }
                        }
                    }
                }
                QueueEvent::TaskProgress {
                    task_id,
                    kind,
                    recording_id,
                    fraction,
                    message,
                } => {
                    broadcaster.broadcast(&Envelope::task_progress_update(json!({
                        "task_id": task_id,
                        "kind": kind.as_str(),
                        "recording_id": recording_id,
                        "progress": fraction,
                        "message": message,
                    })));
                }
                QueueEvent::StatsChanged(stats) => {
                    broadcaster.broadcast(&Envelope::queue_stats_update(json!(stats)));
                }
                _ => {}
            }
        }
    });
}

/// Guard against writing into another streamer's directory.
///
/// The recording's directory must lie beneath the streamer's own
/// directory under the recordings root; a path that instead names a
/// different streamer is never rebased.
pub fn guard_streamer_path(
    recordings_root: &std::path::Path,
    safe_streamer: &str,
    dir: &std::path::Path,
) -> Result<()> {
    let streamer_dir = crate::layout::streamer_dir(recordings_root, safe_streamer);
    if crate::layout::is_within(dir, &streamer_dir) {
        return Ok(());
    }

    // Name mismatch detection: the first component under the root
    // belongs to some other streamer.
    if let Ok(relative) = dir.strip_prefix(recordings_root)
        && let Some(first) = relative.components().next()
    {
        let owner = first.as_os_str().to_string_lossy();
        if owner != safe_streamer {
            return Err(Error::CrossStreamerPath {
                streamer: safe_streamer.to_string(),
                path: dir.to_string_lossy().to_string(),
            });
        }
    }

    Err(Error::CrossStreamerPath {
        streamer: safe_streamer.to_string(),
        path: dir.to_string_lossy().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_dag_edges() {
        let tasks = pipeline_tasks(3, 9);
        assert_eq!(tasks.len(), 6);

        let by_kind = |kind: TaskKind| tasks.iter().find(|t| t.kind == kind).unwrap();
        let remux = by_kind(TaskKind::Mp4Remux);
        let validation = by_kind(TaskKind::Mp4Validation);
        let metadata = by_kind(TaskKind::MetadataGen);
        let chapters = by_kind(TaskKind::ChaptersGen);
        let thumbnail = by_kind(TaskKind::Thumbnail);
        let cleanup = by_kind(TaskKind::Cleanup);

        assert!(remux.depends_on.is_empty());
        assert_eq!(validation.depends_on, vec![remux.id.clone()]);
        assert_eq!(metadata.depends_on, vec![validation.id.clone()]);
        assert_eq!(chapters.depends_on, vec![validation.id.clone()]);
        assert_eq!(
            thumbnail.depends_on,
            vec![metadata.id.clone(), chapters.id.clone()]
        );
        assert_eq!(cleanup.depends_on, vec![thumbnail.id.clone()]);

        for task in &tasks {
            assert_eq!(task.recording_id, Some(3));
        }
    }

    #[test]
    fn test_pipeline_payload_round_trip() {
        let tasks = pipeline_tasks(3, 9);
        let payload = PipelinePayload::from_task(&tasks[0]).unwrap();
        assert_eq!(payload.recording_id, 3);
        assert_eq!(payload.stream_id, 9);
    }

    #[test]
    fn test_guard_accepts_own_directory() {
        guard_streamer_path(
            Path::new("/recordings"),
            "eve",
            Path::new("/recordings/eve/Season 2025-01"),
        )
        .unwrap();
    }

    #[test]
    fn test_guard_rejects_other_streamer() {
        let err = guard_streamer_path(
            Path::new("/recordings"),
            "eve",
            Path::new("/recordings/frank/Season 2025-01"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::CrossStreamerPath { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_guard_rejects_outside_root() {
        let err = guard_streamer_path(
            Path::new("/recordings"),
            "eve",
            Path::new("/elsewhere/eve"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::CrossStreamerPath { .. }));
    }
}
