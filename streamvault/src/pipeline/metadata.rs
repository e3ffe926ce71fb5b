//! Sidecar metadata generation: JSON descriptor plus show and episode
//! NFOs with media-server artwork references.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{guard_streamer_path, PipelineContext, PipelinePayload};
use crate::config::ConfigResolver;
use crate::database::repositories::{
    MetadataPaths, StreamEventRepository, StreamMetadataRepository,
};
use crate::domain::types::{ProcessingStep, StepStatus};
use crate::domain::{Recording, Stream, Streamer};
use crate::jobs::{Task, TaskContext, TaskHandler, TaskKind};
use crate::layout::artwork_dir;
use crate::{Error, Result};

const ARTWORK_FILES: &[&str] = &["poster.jpg", "fanart.jpg", "banner.jpg"];

pub struct MetadataHandler {
    ctx: Arc<PipelineContext>,
}

impl MetadataHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    async fn generate(&self, payload: &PipelinePayload) -> Result<()> {
        let ctx = &self.ctx;
        let (recording, stream, streamer) = ctx.load(payload).await?;
        let config = ctx.config.resolve(streamer.id).await?;

        let mp4_path = PathBuf::from(recording.mp4_path());
        let base_dir = mp4_path
            .parent()
            .ok_or_else(|| Error::Metadata("recording has no parent directory".to_string()))?
            .to_path_buf();
        let safe_name = streamer.safe_name();

        // Never write into another streamer's tree.
        guard_streamer_path(&config.recordings_root, &safe_name, &base_dir)?;

        let json_path = self
            .write_json_descriptor(&recording, &stream, &streamer, &mp4_path)
            .await?;

        let streamer_dir = crate::layout::streamer_dir(&config.recordings_root, &safe_name);
        let tvshow_path = self
            .write_tvshow_nfo(&streamer, &streamer_dir, &config.recordings_root, &safe_name)
            .await?;

        self.ensure_local_artwork(&config.recordings_root, &safe_name, &streamer_dir, &base_dir)
            .await;

        let nfo_path = self
            .write_episode_nfo(
                &recording,
                &stream,
                &streamer,
                &mp4_path,
                &config.recordings_root,
                &safe_name,
            )
            .await?;

        ctx.metadata
            .upsert(
                stream.id,
                MetadataPaths {
                    json_path: Some(json_path),
                    nfo_path: Some(nfo_path),
                    tvshow_nfo_path: Some(tvshow_path),
                    ..MetadataPaths::default()
                },
            )
            .await?;

        info!(recording_id = payload.recording_id, "Metadata sidecars written");
        ctx.activity.record(
            &streamer.username,
            Some(payload.recording_id),
            "metadata_generated",
            &format!("stream={}", stream.id),
        );
        Ok(())
    }

    async fn write_json_descriptor(
        &self,
        recording: &Recording,
        stream: &Stream,
        streamer: &Streamer,
        mp4_path: &Path,
    ) -> Result<String> {
        let events = self.ctx.events.list_by_stream(stream.id).await?;
        let descriptor = json!({
            "stream": {
                "id": stream.id,
                "twitch_stream_id": stream.twitch_stream_id,
                "title": stream.title,
                "category": stream.category_name,
                "language": stream.language,
                "started_at": stream.started_at,
                "ended_at": stream.ended_at,
                "season": stream.season_number(),
                "episode": stream.episode_number,
            },
            "streamer": {
                "id": streamer.id,
                "twitch_id": streamer.twitch_id,
                "username": streamer.username,
                "display_name": streamer.display_name,
            },
            "recording": {
                "id": recording.id,
                "path": mp4_path.to_string_lossy(),
                "duration_secs": recording.duration_secs,
            },
            "events": events
                .iter()
                .map(|e| json!({
                    "kind": e.kind.as_str(),
                    "timestamp": e.timestamp,
                    "offset_secs": e.offset_secs(stream.started_at),
                    "title": e.title,
                    "category": e.category_name,
                }))
                .collect::<Vec<_>>(),
        });

        let path = mp4_path.with_extension("info.json");
        tokio::fs::write(&path, serde_json::to_string_pretty(&descriptor)?).await?;
        Ok(path.to_string_lossy().to_string())
    }

    /// Show-level NFO, written once into the streamer directory.
    async fn write_tvshow_nfo(
        &self,
        streamer: &Streamer,
        streamer_dir: &Path,
        recordings_root: &Path,
        safe_name: &str,
    ) -> Result<String> {
        let path = streamer_dir.join("tvshow.nfo");
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(path.to_string_lossy().to_string());
        }
        tokio::fs::create_dir_all(streamer_dir).await?;

        let mut nfo = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<tvshow>\n");
        nfo.push_str(&format!("  <title>{}</title>\n", escape_xml(&streamer.display_name)));
        nfo.push_str(&format!(
            "  <plot>Twitch streams by {}</plot>\n",
            escape_xml(&streamer.display_name)
        ));
        nfo.push_str(&format!(
            "  <uniqueid type=\"twitch\" default=\"true\">{}</uniqueid>\n",
            escape_xml(&streamer.twitch_id)
        ));
        nfo.push_str("  <genre>Livestream</genre>\n");
        for (tag, file) in [("thumb", "poster.jpg"), ("fanart", "fanart.jpg"), ("banner", "banner.jpg")] {
            if let Some(relative) =
                relative_artwork_path(streamer_dir, recordings_root, safe_name, file)
            {
                nfo.push_str(&format!("  <{tag}>{}</{tag}>\n", escape_xml(&relative)));
            }
        }
        nfo.push_str("</tvshow>\n");

        tokio::fs::write(&path, nfo).await?;
        Ok(path.to_string_lossy().to_string())
    }

    async fn write_episode_nfo(
        &self,
        recording: &Recording,
        stream: &Stream,
        streamer: &Streamer,
        mp4_path: &Path,
        recordings_root: &Path,
        safe_name: &str,
    ) -> Result<String> {
        let title = stream
            .title
            .clone()
            .unwrap_or_else(|| format!("{} stream", streamer.display_name));

        let mut nfo = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<episodedetails>\n",
        );
        nfo.push_str(&format!("  <title>{}</title>\n", escape_xml(&title)));
        nfo.push_str(&format!("  <showtitle>{}</showtitle>\n", escape_xml(&streamer.display_name)));
        nfo.push_str(&format!("  <season>{}</season>\n", stream.season_number()));
        nfo.push_str(&format!("  <episode>{}</episode>\n", stream.episode_number));
        nfo.push_str(&format!(
            "  <aired>{}</aired>\n",
            stream.started_at.format("%Y-%m-%d")
        ));
        if let Some(category) = &stream.category_name {
            nfo.push_str(&format!("  <genre>{}</genre>\n", escape_xml(category)));
        }
        if let Some(duration) = recording.duration_secs {
            nfo.push_str(&format!("  <runtime>{}</runtime>\n", (duration / 60.0).round() as i64));
        }
        let nfo_dir = mp4_path.parent().unwrap_or(recordings_root);
        if let Some(relative) =
            relative_artwork_path(nfo_dir, recordings_root, safe_name, "poster.jpg")
        {
            nfo.push_str(&format!("  <thumb>{}</thumb>\n", escape_xml(&relative)));
        }
        nfo.push_str("</episodedetails>\n");

        let path = mp4_path.with_extension("nfo");
        tokio::fs::write(&path, nfo).await?;
        Ok(path.to_string_lossy().to_string())
    }

    /// Copy artwork next to the NFOs for scanners that refuse to follow
    /// references outside the episode directory.
    async fn ensure_local_artwork(
        &self,
        recordings_root: &Path,
        safe_name: &str,
        streamer_dir: &Path,
        season_dir: &Path,
    ) {
        let source_dir = artwork_dir(recordings_root, safe_name);
        for file in ARTWORK_FILES {
            let source = source_dir.join(file);
            if !tokio::fs::try_exists(&source).await.unwrap_or(false) {
                continue;
            }
            for target_dir in [streamer_dir, season_dir] {
                let target = target_dir.join(file);
                if tokio::fs::try_exists(&target).await.unwrap_or(false) {
                    continue;
                }
                if let Err(e) = tokio::fs::copy(&source, &target).await {
                    debug!(
                        source = %source.display(), target = %target.display(), error = %e,
                        "Artwork fallback copy failed"
                    );
                }
            }
        }
    }
}

/// Relative path from `from_dir` to the streamer's artwork file,
/// provided both sit under the recordings root. Paths escaping the
/// root are refused.
pub fn relative_artwork_path(
    from_dir: &Path,
    recordings_root: &Path,
    safe_name: &str,
    file: &str,
) -> Option<String> {
    let from_relative = from_dir.strip_prefix(recordings_root).ok()?;
    let ups = from_relative.components().count();
    let mut out = String::new();
    for _ in 0..ups {
        out.push_str("../");
    }
    out.push_str(&format!(".media/artwork/{safe_name}/{file}"));
    Some(out)
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[async_trait]
impl TaskHandler for MetadataHandler {
    fn kinds(&self) -> Vec<TaskKind> {
        vec![TaskKind::MetadataGen]
    }

    fn name(&self) -> &'static str {
        "metadata_gen"
    }

    async fn run(&self, task: &Task, _tctx: &TaskContext) -> Result<()> {
        let payload = PipelinePayload::from_task(task)?;
        let ctx = &self.ctx;

        ctx.set_step(
            payload.recording_id,
            ProcessingStep::Metadata,
            StepStatus::Running,
            None,
        )
        .await?;

        match self.generate(&payload).await {
            Ok(()) => {
                ctx.set_step(
                    payload.recording_id,
                    ProcessingStep::Metadata,
                    StepStatus::Completed,
                    None,
                )
                .await?;
                Ok(())
            }
            Err(e) => {
                let message = match &e {
                    Error::CrossStreamerPath { .. } => "CrossStreamerPath".to_string(),
                    other => other.to_string(),
                };
                warn!(recording_id = payload.recording_id, error = %e, "Metadata generation failed");
                ctx.set_step(
                    payload.recording_id,
                    ProcessingStep::Metadata,
                    StepStatus::Failed,
                    Some(&message),
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
    fn test_relative_artwork_from_season_dir() {
        let relative = relative_artwork_path(
            Path::new("/rec/alice/Season 2025-01"),
            Path::new("/rec"),
            "alice",
            "poster.jpg",
        )
        .unwrap();
        assert_eq!(relative, "../../.media/artwork/alice/poster.jpg");
    }

    #[test]
    fn test_relative_artwork_from_streamer_dir() {
        let relative = relative_artwork_path(
            Path::new("/rec/alice"),
            Path::new("/rec"),
            "alice",
            "banner.jpg",
        )
        .unwrap();
        assert_eq!(relative, "../.media/artwork/alice/banner.jpg");
    }

    #[test]
    fn test_relative_artwork_refuses_outside_root() {
        assert!(relative_artwork_path(
            Path::new("/elsewhere/alice"),
            Path::new("/rec"),
            "alice",
            "poster.jpg",
        )
        .is_none());
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("A & B <C>"), "A &amp; B &lt;C&gt;");
    }
}
