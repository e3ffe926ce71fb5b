//! Chapter artefact generation from stream events.
//!
//! One chapter set is rendered into four formats: WebVTT, SRT,
//! FFmpeg metadata, and Emby-compatible XML.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{PipelineContext, PipelinePayload};
use crate::database::repositories::{
    MetadataPaths, StreamEventRepository, StreamMetadataRepository,
};
use crate::domain::types::{ProcessingStep, StepStatus, StreamEventKind};
use crate::domain::{Stream, StreamEvent};
use crate::jobs::{Task, TaskContext, TaskHandler, TaskKind};
use crate::{Error, Result};

/// Chapters shorter than this are merged away.
const MIN_CHAPTER_SECS: f64 = 1.0;

/// A rendered chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub start_secs: f64,
    pub end_secs: f64,
    pub title: String,
}

/// Build the chapter set for a stream.
///
/// Events before the stream start collapse into one chapter at offset
/// zero (the latest pre-stream event wins). Consecutive events sharing
/// a category merge, since the category is the chapter title. With no
/// usable events the whole video becomes a single chapter.
pub fn build_chapters(stream: &Stream, events: &[StreamEvent], duration_secs: f64) -> Vec<Chapter> {
    let fallback_title = stream
        .title
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Full Stream".to_string());

    // Offline events end the stream; they never open a chapter.
    let mut boundary_events: Vec<&StreamEvent> = events
        .iter()
        .filter(|e| {
            matches!(
                e.kind,
                StreamEventKind::Online | StreamEventKind::ChannelUpdate
            )
        })
        .collect();
    boundary_events.sort_by_key(|e| e.timestamp);

    // Collapse pre-stream events: keep only the latest one, clamped to 0.
    let last_pre_stream = boundary_events
        .iter()
        .rposition(|e| e.timestamp < stream.started_at);
    if let Some(index) = last_pre_stream {
        boundary_events.drain(..index);
    }

    let mut boundaries: Vec<(f64, String)> = Vec::new();
    for event in boundary_events {
        let offset = event.offset_secs(stream.started_at);
        if offset >= duration_secs {
            continue;
        }
        let title = event
            .chapter_title()
            .map(|t| t.to_string())
            .unwrap_or_else(|| fallback_title.clone());

        // Category-as-title policy: consecutive same-category events merge.
        if let Some((_, previous)) = boundaries.last()
            && *previous == title
        {
            continue;
        }
        boundaries.push((offset, title));
    }

    if boundaries.is_empty() {
        return vec![Chapter {
            start_secs: 0.0,
            end_secs: duration_secs.max(0.0),
            title: fallback_title,
        }];
    }

    if boundaries[0].0 > 0.0 {
        boundaries[0].0 = 0.0;
    }

    let mut chapters: Vec<Chapter> = Vec::with_capacity(boundaries.len());
    for (i, (start, title)) in boundaries.iter().enumerate() {
        let end = boundaries
            .get(i + 1)
            .map(|(next, _)| *next)
            .unwrap_or(duration_secs);
        if end - start < MIN_CHAPTER_SECS {
            continue;
        }
        chapters.push(Chapter {
            start_secs: *start,
            end_secs: end,
            title: title.clone(),
        });
    }

    // Degenerate timing can drop everything; fall back to one chapter.
    if chapters.is_empty() {
        chapters.push(Chapter {
            start_secs: 0.0,
            end_secs: duration_secs.max(0.0),
            title: fallback_title,
        });
    } else {
        // The set always spans the whole video.
        if let Some(first) = chapters.first_mut() {
            first.start_secs = 0.0;
        }
        if let Some(last) = chapters.last_mut() {
            last.end_secs = duration_secs.max(last.start_secs);
        }
    }
    chapters
}

fn format_timestamp(secs: f64, separator: char) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let (ms, total_secs) = (total_ms % 1000, total_ms / 1000);
    let (s, total_mins) = (total_secs % 60, total_secs / 60);
    let (m, h) = (total_mins % 60, total_mins / 60);
    format!("{h:02}:{m:02}:{s:02}{separator}{ms:03}")
}

/// Render WebVTT chapters.
pub fn render_vtt(chapters: &[Chapter]) -> String {
    let mut out = String::from("WEBVTT - chapters\n\n");
    for chapter in chapters {
        out.push_str(&format!(
            "{} --> {}\n{}\n\n",
            format_timestamp(chapter.start_secs, '.'),
            format_timestamp(chapter.end_secs, '.'),
            chapter.title
        ));
    }
    out
}

/// Render SRT chapters.
pub fn render_srt(chapters: &[Chapter]) -> String {
    let mut out = String::new();
    for (i, chapter) in chapters.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(chapter.start_secs, ','),
            format_timestamp(chapter.end_secs, ','),
            chapter.title
        ));
    }
    out
}

/// Render FFmpeg metadata chapters.
pub fn render_ffmpeg(chapters: &[Chapter]) -> String {
    let mut out = String::from(";FFMETADATA1\n");
    for chapter in chapters {
        out.push_str(&format!(
            "\n[CHAPTER]\nTIMEBASE=1/1000\nSTART={}\nEND={}\ntitle={}\n",
            (chapter.start_secs * 1000.0).round() as u64,
            (chapter.end_secs * 1000.0).round() as u64,
            chapter.title.replace('=', "\\=").replace(';', "\\;")
        ));
    }
    out
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Render Emby/Jellyfin chapter XML.
pub fn render_xml(chapters: &[Chapter]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<Chapters>\n");
    for chapter in chapters {
        out.push_str(&format!(
            "  <Chapter>\n    <Name>{}</Name>\n    <StartTime>{}</StartTime>\n    <EndTime>{}</EndTime>\n  </Chapter>\n",
            escape_xml(&chapter.title),
            format_timestamp(chapter.start_secs, '.'),
            format_timestamp(chapter.end_secs, '.'),
        ));
    }
    out.push_str("</Chapters>\n");
    out
}

pub struct ChaptersHandler {
    ctx: Arc<PipelineContext>,
}

impl ChaptersHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    async fn generate(&self, payload: &PipelinePayload) -> Result<()> {
        let ctx = &self.ctx;
        let (recording, stream, streamer) = ctx.load(payload).await?;

        let mp4_path = PathBuf::from(recording.mp4_path());
        let base = mp4_path.with_extension("");
        let base = base.to_string_lossy();

        // Session duration, falling back to the probed video length.
        let duration = match stream.duration_secs() {
            Some(d) if d > 0.0 => d,
            _ => super::ffmpeg::probe(&mp4_path)
                .await?
                .duration_secs
                .ok_or_else(|| Error::Chapters("no duration available".to_string()))?,
        };

        let events = ctx.events.list_by_stream(stream.id).await?;
        let chapters = build_chapters(&stream, &events, duration);

        let vtt_path = format!("{base}.vtt");
        let srt_path = format!("{base}.srt");
        let ffmpeg_path = format!("{base}-ffmpeg-chapters.txt");
        let xml_path = format!("{base}.xml");

        tokio::fs::write(&vtt_path, render_vtt(&chapters)).await?;
        tokio::fs::write(&srt_path, render_srt(&chapters)).await?;
        tokio::fs::write(&ffmpeg_path, render_ffmpeg(&chapters)).await?;
        tokio::fs::write(&xml_path, render_xml(&chapters)).await?;

        ctx.metadata
            .upsert(
                stream.id,
                MetadataPaths {
                    chapters_vtt_path: Some(vtt_path),
                    chapters_srt_path: Some(srt_path),
                    chapters_ffmpeg_path: Some(ffmpeg_path),
                    chapters_xml_path: Some(xml_path),
                    ..MetadataPaths::default()
                },
            )
            .await?;

        info!(
            recording_id = payload.recording_id,
            chapters = chapters.len(),
            "Chapter artefacts written"
        );
        ctx.activity.record(
            &streamer.username,
            Some(payload.recording_id),
            "chapters_generated",
            &format!("count={}", chapters.len()),
        );
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for ChaptersHandler {
    fn kinds(&self) -> Vec<TaskKind> {
        vec![TaskKind::ChaptersGen]
    }

    fn name(&self) -> &'static str {
        "chapters_gen"
    }

    async fn run(&self, task: &Task, _tctx: &TaskContext) -> Result<()> {
        let payload = PipelinePayload::from_task(task)?;
        let ctx = &self.ctx;

        ctx.set_step(
            payload.recording_id,
            ProcessingStep::Chapters,
            StepStatus::Running,
            None,
        )
        .await?;

        match self.generate(&payload).await {
            Ok(()) => {
                ctx.set_step(
                    payload.recording_id,
                    ProcessingStep::Chapters,
                    StepStatus::Completed,
                    None,
                )
                .await?;
                Ok(())
            }
            Err(e) => {
                let e = match e {
                    Error::Chapters(_) => e,
                    other => Error::Chapters(other.to_string()),
                };
                ctx.set_step(
                    payload.recording_id,
                    ProcessingStep::Chapters,
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
    use chrono::{TimeZone, Utc};

    fn stream() -> Stream {
        Stream {
            id: 1,
            streamer_id: 7,
            twitch_stream_id: Some("s42".to_string()),
            started_at: Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap(),
            ended_at: Some(Utc.with_ymd_and_hms(2025, 1, 2, 11, 0, 0).unwrap()),
            title: Some("Morning stream".to_string()),
            category_name: None,
            language: None,
            recording_path: None,
            episode_number: 1,
        }
    }

    fn event(offset_mins: i64, kind: StreamEventKind, category: &str) -> StreamEvent {
        let stream = stream();
        StreamEvent {
            id: offset_mins,
            stream_id: 1,
            kind,
            timestamp: stream.started_at + chrono::Duration::minutes(offset_mins),
            title: None,
            category_name: if category.is_empty() {
                None
            } else {
                Some(category.to_string())
            },
            language: None,
        }
    }

    #[test]
    fn test_zero_events_single_chapter() {
        let chapters = build_chapters(&stream(), &[], 3600.0);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].start_secs, 0.0);
        assert_eq!(chapters[0].end_secs, 3600.0);
        assert_eq!(chapters[0].title, "Morning stream");
    }

    #[test]
    fn test_category_boundaries() {
        let events = vec![
            event(0, StreamEventKind::Online, "Just Chatting"),
            event(20, StreamEventKind::ChannelUpdate, "Tetris"),
            event(40, StreamEventKind::ChannelUpdate, "Celeste"),
        ];
        let chapters = build_chapters(&stream(), &events, 3600.0);
        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].title, "Just Chatting");
        assert_eq!(chapters[1].start_secs, 1200.0);
        assert_eq!(chapters[2].end_secs, 3600.0);
    }

    #[test]
    fn test_consecutive_same_category_merged() {
        let events = vec![
            event(0, StreamEventKind::Online, "Tetris"),
            event(10, StreamEventKind::ChannelUpdate, "Tetris"),
            event(30, StreamEventKind::ChannelUpdate, "Celeste"),
        ];
        let chapters = build_chapters(&stream(), &events, 3600.0);
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].end_secs, 1800.0);
    }

    #[test]
    fn test_pre_stream_events_collapse_to_zero() {
        let events = vec![
            event(-30, StreamEventKind::ChannelUpdate, "Old Category"),
            event(-5, StreamEventKind::ChannelUpdate, "Fresh Category"),
            event(20, StreamEventKind::ChannelUpdate, "Tetris"),
        ];
        let chapters = build_chapters(&stream(), &events, 3600.0);
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].start_secs, 0.0);
        assert_eq!(chapters[0].title, "Fresh Category");
        assert_eq!(chapters[1].title, "Tetris");
    }

    #[test]
    fn test_offline_events_are_not_boundaries() {
        let events = vec![
            event(0, StreamEventKind::Online, "Tetris"),
            event(60, StreamEventKind::Offline, ""),
        ];
        let chapters = build_chapters(&stream(), &events, 3600.0);
        assert_eq!(chapters.len(), 1);
    }

    #[test]
    fn test_sub_second_chapter_dropped() {
        let stream = stream();
        let mut early = event(0, StreamEventKind::Online, "Blink");
        early.timestamp = stream.started_at;
        let mut next = event(0, StreamEventKind::ChannelUpdate, "Real Start");
        next.timestamp = stream.started_at + chrono::Duration::milliseconds(500);
        let chapters = build_chapters(&stream, &[early, next], 3600.0);
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].title, "Real Start");
        assert_eq!(chapters[0].start_secs, 0.0);
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_timestamp(0.0, '.'), "00:00:00.000");
        assert_eq!(format_timestamp(3661.5, '.'), "01:01:01.500");
        assert_eq!(format_timestamp(59.9994, ','), "00:00:59,999");
    }

    #[test]
    fn test_renderers() {
        let chapters = vec![Chapter {
            start_secs: 0.0,
            end_secs: 60.0,
            title: "Intro & Setup".to_string(),
        }];

        let vtt = render_vtt(&chapters);
        assert!(vtt.starts_with("WEBVTT"));
        assert!(vtt.contains("00:00:00.000 --> 00:01:00.000"));

        let srt = render_srt(&chapters);
        assert!(srt.starts_with("1\n"));
        assert!(srt.contains("00:00:00,000 --> 00:01:00,000"));

        let ffmeta = render_ffmpeg(&chapters);
        assert!(ffmeta.starts_with(";FFMETADATA1"));
        assert!(ffmeta.contains("START=0"));
        assert!(ffmeta.contains("END=60000"));

        let xml = render_xml(&chapters);
        assert!(xml.contains("<Name>Intro &amp; Setup</Name>"));
        assert!(xml.contains("<StartTime>00:00:00.000</StartTime>"));
    }
}
