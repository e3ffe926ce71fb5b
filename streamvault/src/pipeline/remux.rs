//! Container-copy remux of the `.ts` capture into an `.mp4`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use super::{PipelineContext, PipelinePayload};
use crate::database::repositories::{
    MetadataPaths, RecordingRepository, StreamMetadataRepository, StreamRepository,
};
use crate::domain::types::{ProcessingStep, StepStatus};
use crate::domain::{Stream, Streamer};
use crate::jobs::{Task, TaskContext, TaskHandler, TaskKind};
use crate::supervisor::{convert_log_path, SpawnSpec};
use crate::ws::Envelope;
use crate::{Error, Result};

pub struct RemuxHandler {
    ctx: Arc<PipelineContext>,
}

impl RemuxHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Write the FFmpeg metadata sidecar consumed via `-map_metadata`.
    async fn write_metadata_sidecar(
        &self,
        stream: &Stream,
        streamer: &Streamer,
        mp4_path: &Path,
    ) -> Result<PathBuf> {
        let sidecar = mp4_path.with_extension("ffmeta");
        let mut content = String::from(";FFMETADATA1\n");
        let title = stream
            .title
            .clone()
            .unwrap_or_else(|| format!("{} stream", streamer.display_name));
        content.push_str(&format!("title={}\n", escape_ffmeta(&title)));
        content.push_str(&format!("artist={}\n", escape_ffmeta(&streamer.display_name)));
        content.push_str(&format!("date={}\n", stream.started_at.format("%Y-%m-%d")));
        if let Some(category) = &stream.category_name {
            content.push_str(&format!("genre={}\n", escape_ffmeta(category)));
        }
        tokio::fs::write(&sidecar, content).await?;
        Ok(sidecar)
    }
}

/// Escape `=`, `;`, `#`, `\` and newlines per the FFMETADATA format.
fn escape_ffmeta(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '=' | ';' | '#' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push(' '),
            other => out.push(other),
        }
    }
    out
}

#[async_trait]
impl TaskHandler for RemuxHandler {
    fn kinds(&self) -> Vec<TaskKind> {
        vec![TaskKind::Mp4Remux]
    }

    fn name(&self) -> &'static str {
        "mp4_remux"
    }

    async fn run(&self, task: &Task, tctx: &TaskContext) -> Result<()> {
        let payload = PipelinePayload::from_task(task)?;
        let ctx = &self.ctx;

        ctx.set_step(
            payload.recording_id,
            ProcessingStep::Mp4Remux,
            StepStatus::Running,
            None,
        )
        .await?;

        let result = self.remux(&payload, tctx).await;
        match &result {
            Ok(()) => {
                ctx.set_step(
                    payload.recording_id,
                    ProcessingStep::Mp4Remux,
                    StepStatus::Completed,
                    None,
                )
                .await?;
            }
            Err(e) => {
                ctx.set_step(
                    payload.recording_id,
                    ProcessingStep::Mp4Remux,
                    StepStatus::Failed,
                    Some(&e.to_string()),
                )
                .await?;
            }
        }
        result
    }
}

impl RemuxHandler {
    async fn remux(&self, payload: &PipelinePayload, tctx: &TaskContext) -> Result<()> {
        let ctx = &self.ctx;
        let (recording, stream, streamer) = ctx.load(payload).await?;

        let ts_path = PathBuf::from(recording.ts_path());
        let mp4_path = PathBuf::from(recording.mp4_path());

        let ts_size = tokio::fs::metadata(&ts_path)
            .await
            .map(|m| m.len())
            .map_err(|_| {
                Error::RemuxFailed(format!("capture file missing: {}", ts_path.display()))
            })?;

        // Idempotence: a finished MP4 from an earlier attempt is reused.
        if let Ok(existing) = tokio::fs::metadata(&mp4_path).await
            && existing.len() > 0
            && super::ffmpeg::probe(&mp4_path)
                .await
                .map(|p| p.video_streams > 0)
                .unwrap_or(false)
        {
            info!(mp4 = %mp4_path.display(), "MP4 already present; skipping remux");
            self.publish_success(payload, &stream, &mp4_path).await?;
            return Ok(());
        }

        let sidecar = self.write_metadata_sidecar(&stream, &streamer, &mp4_path).await?;

        let handle_id = format!("remux-{}", payload.recording_id);
        let log_path = convert_log_path(&ctx.log_dir, &streamer.safe_name(), "remux", Utc::now());
        let spec = SpawnSpec::new(&handle_id, super::ffmpeg::ffmpeg_binary())
            .args([
                "-y".to_string(),
                "-hide_banner".to_string(),
                "-fflags".to_string(),
                "+genpts+discardcorrupt".to_string(),
                "-i".to_string(),
                ts_path.to_string_lossy().to_string(),
                "-i".to_string(),
                sidecar.to_string_lossy().to_string(),
                "-map_metadata".to_string(),
                "1".to_string(),
                "-c".to_string(),
                "copy".to_string(),
                "-bsf:a".to_string(),
                "aac_adtstoasc".to_string(),
                "-movflags".to_string(),
                "faststart".to_string(),
                mp4_path.to_string_lossy().to_string(),
            ])
            .env("LC_ALL", "C")
            .log_to(log_path);

        ctx.supervisor.spawn(spec).await?;
        tctx.progress.report(0.01, Some("remuxing"));

        // Poll output growth for progress until the child exits.
        let exit_code = loop {
            if let Some(code) = ctx.supervisor.exit_code(&handle_id) {
                break code;
            }
            if tctx.cancellation_token.is_cancelled() {
                ctx.supervisor
                    .terminate(&handle_id, Duration::from_secs(5))
                    .await;
                ctx.supervisor.forget(&handle_id);
                let _ = tokio::fs::remove_file(&sidecar).await;
                return Err(Error::Cancelled);
            }
            let written = tokio::fs::metadata(&mp4_path).await.map(|m| m.len()).unwrap_or(0);
            let fraction = (written as f64 / ts_size as f64).clamp(0.0, 0.99);
            tctx.progress.report(fraction, None);
            tokio::time::sleep(Duration::from_millis(500)).await;
        };
        ctx.supervisor.forget(&handle_id);
        let _ = tokio::fs::remove_file(&sidecar).await;

        if exit_code != 0 {
            return Err(Error::RemuxFailed(format!(
                "ffmpeg exited with code {exit_code} for {}",
                ts_path.display()
            )));
        }

        let mp4_size = tokio::fs::metadata(&mp4_path).await.map(|m| m.len()).unwrap_or(0);
        if mp4_size == 0 {
            return Err(Error::RemuxFailed(format!(
                "remux produced an empty file: {}",
                mp4_path.display()
            )));
        }

        info!(
            recording_id = payload.recording_id,
            ts_size, mp4_size, "Remux complete"
        );
        ctx.activity.record(
            &streamer.username,
            Some(payload.recording_id),
            "mp4_remux_complete",
            &format!("ts_bytes={ts_size} mp4_bytes={mp4_size}"),
        );
        tctx.progress.report(1.0, Some("remux complete"));

        self.publish_success(payload, &stream, &mp4_path).await
    }

    async fn publish_success(
        &self,
        payload: &PipelinePayload,
        stream: &Stream,
        mp4_path: &Path,
    ) -> Result<()> {
        let ctx = &self.ctx;
        let mp4_str = mp4_path.to_string_lossy().to_string();

        ctx.streams.set_recording_path(stream.id, &mp4_str).await?;
        if let Err(e) = ctx
            .recordings
            .update(
                payload.recording_id,
                crate::database::repositories::RecordingUpdate {
                    path: Some(mp4_str.clone()),
                    ..Default::default()
                },
            )
            .await
        {
            warn!(recording_id = payload.recording_id, error = %e, "Failed to update recording path");
        }
        ctx.metadata
            .upsert(
                stream.id,
                MetadataPaths {
                    metadata_embedded: Some(true),
                    ..MetadataPaths::default()
                },
            )
            .await?;

        ctx.broadcaster.broadcast(&Envelope::recording_available(json!({
            "recording_id": payload.recording_id,
            "stream_id": stream.id,
            "path": mp4_str,
        })));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_ffmeta() {
        assert_eq!(escape_ffmeta("a=b;c"), "a\\=b\\;c");
        assert_eq!(escape_ffmeta("line\nbreak"), "line break");
        assert_eq!(escape_ffmeta("back\\slash"), "back\\\\slash");
        assert_eq!(escape_ffmeta("plain title"), "plain title");
    }
}
