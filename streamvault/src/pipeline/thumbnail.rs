//! Thumbnail generation with media-server copies.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::ffmpeg::{decode_gray_pixels, ffmpeg_binary, is_uniform_placeholder};
use super::preview::preview_path;
use super::{PipelineContext, PipelinePayload};
use crate::database::repositories::{MetadataPaths, StreamMetadataRepository};
use crate::domain::types::{ProcessingStep, StepStatus};
use crate::jobs::{Task, TaskContext, TaskHandler, TaskKind};
use crate::{Error, Result};

/// Frame extraction offsets tried in order.
const EXTRACT_OFFSETS_SECS: &[u32] = &[10, 30, 120];

/// Smallest acceptable thumbnail.
const MIN_THUMB_BYTES: u64 = 1024;

/// Histogram share that marks a frame as a grey placeholder.
const PLACEHOLDER_UNIFORMITY: f64 = 0.70;

pub struct ThumbnailHandler {
    ctx: Arc<PipelineContext>,
}

impl ThumbnailHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    async fn generate(&self, payload: &PipelinePayload) -> Result<()> {
        let ctx = &self.ctx;
        let (recording, stream, streamer) = ctx.load(payload).await?;

        let mp4_path = PathBuf::from(recording.mp4_path());
        let base = mp4_path.with_extension("");
        let thumb_path = PathBuf::from(format!("{}-thumb.jpg", base.to_string_lossy()));

        // Idempotence: keep an existing valid thumbnail.
        if !self.is_acceptable(&thumb_path).await {
            let source = self.pick_source(&recording.path, &mp4_path).await?;
            tokio::fs::copy(&source, &thumb_path).await?;
        }

        // Media-server copies: poster.jpg and <basename>.jpg.
        let basename_jpg = base.with_extension("jpg");
        let poster = mp4_path
            .parent()
            .map(|d| d.join("poster.jpg"))
            .unwrap_or_else(|| PathBuf::from("poster.jpg"));
        for target in [&basename_jpg, &poster] {
            if let Err(e) = tokio::fs::copy(&thumb_path, target).await {
                warn!(target = %target.display(), error = %e, "Failed to copy thumbnail");
            }
        }

        ctx.metadata
            .upsert(
                stream.id,
                MetadataPaths {
                    thumbnail_path: Some(thumb_path.to_string_lossy().to_string()),
                    ..MetadataPaths::default()
                },
            )
            .await?;

        info!(recording_id = payload.recording_id, thumb = %thumb_path.display(), "Thumbnail ready");
        ctx.activity.record(
            &streamer.username,
            Some(payload.recording_id),
            "thumbnail_generated",
            &format!("path={}", thumb_path.display()),
        );
        Ok(())
    }

    /// Prefer the live preview; otherwise extract frames at increasing
    /// offsets until one passes the placeholder check.
    async fn pick_source(&self, recording_path: &str, mp4_path: &Path) -> Result<PathBuf> {
        let preview = preview_path(recording_path);
        if self.is_acceptable(&preview).await {
            debug!(preview = %preview.display(), "Using live preview as thumbnail source");
            return Ok(preview);
        }

        for offset in EXTRACT_OFFSETS_SECS {
            let candidate = mp4_path.with_extension(format!("frame{offset}.jpg"));
            if let Err(e) = extract_frame(mp4_path, &candidate, *offset).await {
                debug!(offset, error = %e, "Frame extraction failed");
                continue;
            }
            if self.is_acceptable(&candidate).await {
                return Ok(candidate);
            }
            let _ = tokio::fs::remove_file(&candidate).await;
        }

        Err(Error::Thumbnail(format!(
            "no usable thumbnail source for {}",
            mp4_path.display()
        )))
    }

    /// Size and uniformity gate for a candidate image.
    async fn is_acceptable(&self, path: &Path) -> bool {
        let size = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(_) => return false,
        };
        if size < MIN_THUMB_BYTES {
            return false;
        }
        match decode_gray_pixels(path).await {
            Ok(pixels) => !is_uniform_placeholder(&pixels, PLACEHOLDER_UNIFORMITY),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Could not decode candidate");
                false
            }
        }
    }
}

/// Extract a single frame at the given offset.
async fn extract_frame(mp4_path: &Path, target: &Path, offset_secs: u32) -> Result<()> {
    let output = Command::new(ffmpeg_binary())
        .args(["-v", "error", "-ss", &offset_secs.to_string(), "-i"])
        .arg(mp4_path)
        .args(["-frames:v", "1", "-q:v", "2", "-y"])
        .arg(target)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::Spawn {
            command: "ffmpeg".to_string(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(Error::Thumbnail(format!(
            "frame extraction at +{offset_secs}s failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

#[async_trait]
impl TaskHandler for ThumbnailHandler {
    fn kinds(&self) -> Vec<TaskKind> {
        vec![TaskKind::Thumbnail]
    }

    fn name(&self) -> &'static str {
        "thumbnail"
    }

    async fn run(&self, task: &Task, _tctx: &TaskContext) -> Result<()> {
        let payload = PipelinePayload::from_task(task)?;
        let ctx = &self.ctx;

        ctx.set_step(
            payload.recording_id,
            ProcessingStep::Thumbnail,
            StepStatus::Running,
            None,
        )
        .await?;

        match self.generate(&payload).await {
            Ok(()) => {
                ctx.set_step(
                    payload.recording_id,
                    ProcessingStep::Thumbnail,
                    StepStatus::Completed,
                    None,
                )
                .await?;
                Ok(())
            }
            Err(e) => {
                ctx.set_step(
                    payload.recording_id,
                    ProcessingStep::Thumbnail,
                    StepStatus::Failed,
                    Some(&e.to_string()),
                )
                .await?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_offsets_ladder() {
        assert_eq!(EXTRACT_OFFSETS_SECS, &[10, 30, 120]);
    }
}
