//! Cleanup tasks: drain-and-delete of the `.ts` intermediate, retention
//! enforcement, and unconditional stream-deletion cleanup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{PipelineContext, PipelinePayload};
use crate::config::ConfigResolver;
use crate::database::repositories::{
    ProcessingRepository, RecordingRepository, StreamRepository,
};
use crate::domain::types::{ProcessingStep, StepStatus};
use crate::jobs::{Task, TaskContext, TaskHandler, TaskKind};
use crate::{Error, Result};

/// How long cleanup waits for writers to drain before giving up.
const DEFAULT_WRITER_DRAIN_BUDGET: Duration = Duration::from_secs(30 * 60);

/// Poll interval while waiting for writers.
const WRITER_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Sidecar suffixes removed together with a recording.
const SIDECAR_SUFFIXES: &[&str] = &[
    ".ts",
    ".mp4",
    ".nfo",
    ".info.json",
    ".vtt",
    ".srt",
    ".xml",
    "-ffmpeg-chapters.txt",
    "-thumb.jpg",
    "-preview.jpg",
    ".jpg",
];

pub struct CleanupHandler {
    ctx: Arc<PipelineContext>,
    drain_budget: Duration,
}

impl CleanupHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self {
            ctx,
            drain_budget: DEFAULT_WRITER_DRAIN_BUDGET,
        }
    }

    pub fn with_drain_budget(ctx: Arc<PipelineContext>, drain_budget: Duration) -> Self {
        Self { ctx, drain_budget }
    }

    async fn cleanup(&self, payload: &PipelinePayload, tctx: &TaskContext) -> Result<()> {
        let ctx = &self.ctx;
        let (recording, stream, streamer) = ctx.load(payload).await?;

        // The intermediate is only deleted after a passed validation;
        // otherwise it stays for manual salvage.
        let state = ctx.processing.get(payload.recording_id).await?;
        if state.mp4_validation != StepStatus::Completed {
            info!(
                recording_id = payload.recording_id,
                "Validation not completed; retaining .ts intermediate"
            );
            return Ok(());
        }

        let ts_path = PathBuf::from(recording.ts_path());
        let mp4_path = PathBuf::from(recording.mp4_path());

        if tokio::fs::try_exists(&ts_path).await.unwrap_or(false) {
            self.wait_for_writers(&ts_path, &mp4_path, tctx).await?;
            tokio::fs::remove_file(&ts_path).await?;
            info!(recording_id = payload.recording_id, ts = %ts_path.display(), "Removed .ts intermediate");
        }

        // Drop leftover extraction frames from the thumbnail ladder.
        for offset in [10u32, 30, 120] {
            let frame = mp4_path.with_extension(format!("frame{offset}.jpg"));
            let _ = tokio::fs::remove_file(&frame).await;
        }

        self.enforce_retention(&streamer.username, stream.streamer_id).await;

        ctx.activity.record(
            &streamer.username,
            Some(payload.recording_id),
            "cleanup_complete",
            &format!("stream={}", stream.id),
        );

        // Let the recovery coordinator reclaim abandoned recordings.
        ctx.orphan_check.notify_waiters();
        Ok(())
    }

    /// Wait until no supervised child references either file.
    async fn wait_for_writers(
        &self,
        ts_path: &Path,
        mp4_path: &Path,
        tctx: &TaskContext,
    ) -> Result<()> {
        let deadline = tokio::time::Instant::now() + self.drain_budget;
        loop {
            let ts = ts_path.to_string_lossy();
            let mp4 = mp4_path.to_string_lossy();
            let busy = self.ctx.supervisor.any_running_references(&ts)
                || self.ctx.supervisor.any_running_references(&mp4);
            if !busy {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Cleanup(format!(
                    "writers still reference {} after {}s",
                    ts_path.display(),
                    self.drain_budget.as_secs()
                )));
            }
            if tctx.cancellation_token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            debug!(ts = %ts_path.display(), "Waiting for writers to drain");
            tokio::time::sleep(WRITER_POLL_INTERVAL).await;
        }
    }

    /// Enforce `retention.maxStreams` by queueing deletion of the
    /// oldest streams beyond the bound.
    async fn enforce_retention(&self, username: &str, streamer_id: i64) {
        let ctx = &self.ctx;
        let config = match ctx.config.resolve(streamer_id).await {
            Ok(config) => config,
            Err(e) => {
                warn!(streamer_id, error = %e, "Retention check skipped");
                return;
            }
        };
        if config.max_streams <= 0 {
            return;
        }

        let streams = match ctx.streams.recent_by_streamer(streamer_id, i64::MAX).await {
            Ok(streams) => streams,
            Err(e) => {
                warn!(streamer_id, error = %e, "Retention listing failed");
                return;
            }
        };
        let excess: Vec<_> = streams
            .into_iter()
            .filter(|s| s.ended_at.is_some())
            .skip(config.max_streams as usize)
            .collect();
        if excess.is_empty() {
            return;
        }

        info!(
            streamer = username,
            count = excess.len(),
            max = config.max_streams,
            "Queueing retention deletions"
        );
        for stream in excess {
            // Best effort; the deletion task is durable once enqueued.
            let task = super::stream_deletion_task(stream.id);
            if let Err(e) = ctx.queue.enqueue(vec![task]).await {
                warn!(stream_id = stream.id, error = %e, "Failed to enqueue stream deletion");
            }
        }
    }
}

#[async_trait]
impl TaskHandler for CleanupHandler {
    fn kinds(&self) -> Vec<TaskKind> {
        vec![TaskKind::Cleanup]
    }

    fn name(&self) -> &'static str {
        "cleanup"
    }

    async fn run(&self, task: &Task, tctx: &TaskContext) -> Result<()> {
        let payload = PipelinePayload::from_task(task)?;
        let ctx = &self.ctx;

        ctx.set_step(
            payload.recording_id,
            ProcessingStep::Cleanup,
            StepStatus::Running,
            None,
        )
        .await?;

        match self.cleanup(&payload, tctx).await {
            Ok(()) => {
                ctx.set_step(
                    payload.recording_id,
                    ProcessingStep::Cleanup,
                    StepStatus::Completed,
                    None,
                )
                .await?;
                Ok(())
            }
            Err(e) => {
                ctx.set_step(
                    payload.recording_id,
                    ProcessingStep::Cleanup,
                    StepStatus::Failed,
                    Some(&e.to_string()),
                )
                .await?;
                Err(e)
            }
        }
    }
}

/// Unconditional removal of every artefact of a deleted stream.
pub struct StreamDeletionHandler {
    ctx: Arc<PipelineContext>,
}

impl StreamDeletionHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[derive(Debug, Deserialize)]
struct StreamDeletionPayload {
    stream_id: i64,
}

#[async_trait]
impl TaskHandler for StreamDeletionHandler {
    fn kinds(&self) -> Vec<TaskKind> {
        vec![TaskKind::StreamDeletion]
    }

    fn name(&self) -> &'static str {
        "stream_deletion"
    }

    async fn run(&self, task: &Task, _tctx: &TaskContext) -> Result<()> {
        let payload: StreamDeletionPayload = serde_json::from_value(task.payload.clone())?;
        let ctx = &self.ctx;

        let stream = match ctx.streams.get(payload.stream_id).await {
            Ok(stream) => stream,
            Err(Error::NotFound { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };

        let mut removed = 0usize;
        let bases: Vec<String> = ctx
            .recordings
            .list_by_stream(stream.id)
            .await?
            .into_iter()
            .map(|r| {
                r.path
                    .trim_end_matches(".ts")
                    .trim_end_matches(".mp4")
                    .to_string()
            })
            .chain(stream.recording_path.iter().map(|p| {
                p.trim_end_matches(".ts").trim_end_matches(".mp4").to_string()
            }))
            .collect();

        for base in bases {
            for suffix in SIDECAR_SUFFIXES {
                let path = PathBuf::from(format!("{base}{suffix}"));
                if tokio::fs::remove_file(&path).await.is_ok() {
                    removed += 1;
                }
            }
        }

        ctx.streams.delete(stream.id).await?;
        info!(stream_id = payload.stream_id, files = removed, "Stream artefacts deleted");
        Ok(())
    }
}
