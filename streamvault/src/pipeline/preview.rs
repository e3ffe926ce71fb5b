//! Delayed live preview snapshot.
//!
//! A few minutes into a capture we pull the live preview image from the
//! Twitch CDN. The thumbnail step later prefers this shot over frames
//! extracted from the video.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::PipelineContext;
use crate::database::repositories::RecordingRepository;
use crate::domain::types::RecordingStatus;
use crate::jobs::{Task, TaskContext, TaskHandler, TaskKind};
use crate::{Error, Result};

const PREVIEW_WIDTH: u32 = 1280;
const PREVIEW_HEIGHT: u32 = 720;

#[derive(Debug, Deserialize)]
struct PreviewPayload {
    recording_id: i64,
    #[allow(dead_code)]
    stream_id: i64,
    username: String,
}

/// Preview URL on the Twitch CDN.
pub fn preview_url(username: &str) -> String {
    format!(
        "https://static-cdn.jtvnw.net/previews-ttv/live_user_{}-{PREVIEW_WIDTH}x{PREVIEW_HEIGHT}.jpg",
        username.to_lowercase()
    )
}

/// Path of the preview shot next to the recording.
pub fn preview_path(recording_path: &str) -> PathBuf {
    let base = recording_path
        .trim_end_matches(".ts")
        .trim_end_matches(".mp4");
    PathBuf::from(format!("{base}-preview.jpg"))
}

pub struct LivePreviewHandler {
    ctx: Arc<PipelineContext>,
}

impl LivePreviewHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskHandler for LivePreviewHandler {
    fn kinds(&self) -> Vec<TaskKind> {
        vec![TaskKind::LivePreview]
    }

    fn name(&self) -> &'static str {
        "live_preview"
    }

    async fn run(&self, task: &Task, _tctx: &TaskContext) -> Result<()> {
        let payload: PreviewPayload = serde_json::from_value(task.payload.clone())?;
        let ctx = &self.ctx;

        let recording = ctx.recordings.get(payload.recording_id).await?;
        if recording.status != RecordingStatus::Recording {
            debug!(
                recording_id = payload.recording_id,
                "Recording no longer active; skipping live preview"
            );
            return Ok(());
        }

        let url = preview_url(&payload.username);
        let response = ctx.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Thumbnail(format!(
                "preview download returned {} for {url}",
                response.status()
            )));
        }
        let bytes = response.bytes().await?;
        if bytes.len() < 1024 {
            return Err(Error::Thumbnail(format!(
                "preview image too small: {} bytes",
                bytes.len()
            )));
        }

        let target = preview_path(&recording.path);
        tokio::fs::write(&target, &bytes).await?;
        info!(
            recording_id = payload.recording_id,
            path = %target.display(),
            bytes = bytes.len(),
            "Live preview captured"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_url_lowercases_login() {
        assert_eq!(
            preview_url("Alice"),
            "https://static-cdn.jtvnw.net/previews-ttv/live_user_alice-1280x720.jpg"
        );
    }

    #[test]
    fn test_preview_path_strips_extensions() {
        assert_eq!(
            preview_path("/rec/alice/ep1.ts"),
            PathBuf::from("/rec/alice/ep1-preview.jpg")
        );
        assert_eq!(
            preview_path("/rec/alice/ep1.mp4"),
            PathBuf::from("/rec/alice/ep1-preview.jpg")
        );
    }
}
