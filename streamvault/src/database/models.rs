//! Database row models and conversions into domain entities.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::domain::{
    GlobalSettings, ProcessingState, Recording, Stream, StreamEvent, StreamMetadata, Streamer,
    StreamerRecordingSettings,
};
use crate::domain::types::{RecordingStatus, StepStatus, StreamEventKind};
use crate::{Error, Result};

#[derive(Debug, Clone, FromRow)]
pub struct StreamerRow {
    pub id: i64,
    pub twitch_id: String,
    pub username: String,
    pub display_name: String,
    pub profile_image_url: Option<String>,
    pub title: Option<String>,
    pub category_name: Option<String>,
    pub language: Option<String>,
    pub is_live: bool,
    pub recording_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StreamerRow> for Streamer {
    fn from(row: StreamerRow) -> Self {
        Self {
            id: row.id,
            twitch_id: row.twitch_id,
            username: row.username,
            display_name: row.display_name,
            profile_image_url: row.profile_image_url,
            title: row.title,
            category_name: row.category_name,
            language: row.language,
            is_live: row.is_live,
            recording_enabled: row.recording_enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct StreamRow {
    pub id: i64,
    pub streamer_id: i64,
    pub twitch_stream_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub category_name: Option<String>,
    pub language: Option<String>,
    pub recording_path: Option<String>,
    pub episode_number: i64,
}

impl From<StreamRow> for Stream {
    fn from(row: StreamRow) -> Self {
        Self {
            id: row.id,
            streamer_id: row.streamer_id,
            twitch_stream_id: row.twitch_stream_id,
            started_at: row.started_at,
            ended_at: row.ended_at,
            title: row.title,
            category_name: row.category_name,
            language: row.language,
            recording_path: row.recording_path,
            episode_number: row.episode_number,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct StreamEventRow {
    pub id: i64,
    pub stream_id: i64,
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    pub title: Option<String>,
    pub category_name: Option<String>,
    pub language: Option<String>,
}

impl TryFrom<StreamEventRow> for StreamEvent {
    type Error = Error;

    fn try_from(row: StreamEventRow) -> Result<Self> {
        let kind = StreamEventKind::parse(&row.kind)
            .ok_or_else(|| Error::database(format!("unknown stream event kind: {}", row.kind)))?;
        Ok(Self {
            id: row.id,
            stream_id: row.stream_id,
            kind,
            timestamp: row.timestamp,
            title: row.title,
            category_name: row.category_name,
            language: row.language,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RecordingRow {
    pub id: i64,
    pub stream_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: String,
    pub path: String,
    pub duration_secs: Option<f64>,
    pub used_proxy: bool,
}

impl TryFrom<RecordingRow> for Recording {
    type Error = Error;

    fn try_from(row: RecordingRow) -> Result<Self> {
        let status = RecordingStatus::parse(&row.status)
            .ok_or_else(|| Error::database(format!("unknown recording status: {}", row.status)))?;
        Ok(Self {
            id: row.id,
            stream_id: row.stream_id,
            start_time: row.start_time,
            end_time: row.end_time,
            status,
            path: row.path,
            duration_secs: row.duration_secs,
            used_proxy: row.used_proxy,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ProcessingStateRow {
    pub recording_id: i64,
    pub metadata: String,
    pub chapters: String,
    pub mp4_remux: String,
    pub mp4_validation: String,
    pub thumbnail: String,
    pub cleanup: String,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

fn parse_step(raw: &str) -> Result<StepStatus> {
    StepStatus::parse(raw)
        .ok_or_else(|| Error::database(format!("unknown processing step status: {raw}")))
}

impl TryFrom<ProcessingStateRow> for ProcessingState {
    type Error = Error;

    fn try_from(row: ProcessingStateRow) -> Result<Self> {
        Ok(Self {
            recording_id: row.recording_id,
            metadata: parse_step(&row.metadata)?,
            chapters: parse_step(&row.chapters)?,
            mp4_remux: parse_step(&row.mp4_remux)?,
            mp4_validation: parse_step(&row.mp4_validation)?,
            thumbnail: parse_step(&row.thumbnail)?,
            cleanup: parse_step(&row.cleanup)?,
            last_error: row.last_error,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct StreamMetadataRow {
    pub id: i64,
    pub stream_id: i64,
    pub json_path: Option<String>,
    pub nfo_path: Option<String>,
    pub tvshow_nfo_path: Option<String>,
    pub chapters_vtt_path: Option<String>,
    pub chapters_srt_path: Option<String>,
    pub chapters_ffmpeg_path: Option<String>,
    pub chapters_xml_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub metadata_embedded: bool,
}

impl From<StreamMetadataRow> for StreamMetadata {
    fn from(row: StreamMetadataRow) -> Self {
        Self {
            id: row.id,
            stream_id: row.stream_id,
            json_path: row.json_path,
            nfo_path: row.nfo_path,
            tvshow_nfo_path: row.tvshow_nfo_path,
            chapters_vtt_path: row.chapters_vtt_path,
            chapters_srt_path: row.chapters_srt_path,
            chapters_ffmpeg_path: row.chapters_ffmpeg_path,
            chapters_xml_path: row.chapters_xml_path,
            thumbnail_path: row.thumbnail_path,
            metadata_embedded: row.metadata_embedded,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct GlobalSettingsRow {
    pub id: i64,
    pub default_quality: String,
    pub supported_codecs: String,
    pub filename_template: String,
    pub http_proxy: String,
    pub https_proxy: String,
    pub proxy_preflight: bool,
    pub max_streams_per_streamer: i64,
    pub max_concurrent_recordings: i64,
    pub oauth_token: Option<String>,
    pub strict_no_proxy_validation: bool,
    pub recordings_root: String,
    pub log_filter_directive: String,
}

impl From<GlobalSettingsRow> for GlobalSettings {
    fn from(row: GlobalSettingsRow) -> Self {
        Self {
            default_quality: row.default_quality,
            supported_codecs: split_codecs(&row.supported_codecs),
            filename_template: row.filename_template,
            http_proxy: row.http_proxy,
            https_proxy: row.https_proxy,
            proxy_preflight: row.proxy_preflight,
            max_streams_per_streamer: row.max_streams_per_streamer,
            max_concurrent_recordings: row.max_concurrent_recordings.max(1) as usize,
            oauth_token: row.oauth_token.filter(|t| !t.is_empty()),
            strict_no_proxy_validation: row.strict_no_proxy_validation,
            recordings_root: row.recordings_root,
            log_filter_directive: row.log_filter_directive,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct StreamerRecordingSettingsRow {
    pub streamer_id: i64,
    pub quality: Option<String>,
    pub supported_codecs: Option<String>,
    pub filename_template: Option<String>,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub max_streams: Option<i64>,
    pub oauth_token: Option<String>,
}

impl From<StreamerRecordingSettingsRow> for StreamerRecordingSettings {
    fn from(row: StreamerRecordingSettingsRow) -> Self {
        Self {
            streamer_id: row.streamer_id,
            quality: row.quality.filter(|s| !s.is_empty()),
            supported_codecs: row
                .supported_codecs
                .filter(|s| !s.is_empty())
                .map(|s| split_codecs(&s)),
            filename_template: row.filename_template.filter(|s| !s.is_empty()),
            http_proxy: row.http_proxy,
            https_proxy: row.https_proxy,
            max_streams: row.max_streams,
            oauth_token: row.oauth_token.filter(|s| !s.is_empty()),
        }
    }
}

fn split_codecs(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: String,
    pub kind: String,
    pub priority: i64,
    pub payload: String,
    pub state: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub progress: f64,
    pub recording_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub not_before: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_codecs() {
        assert_eq!(split_codecs("h265, h264"), vec!["h265", "h264"]);
        assert!(split_codecs("").is_empty());
    }

    #[test]
    fn test_recording_row_rejects_unknown_status() {
        let row = RecordingRow {
            id: 1,
            stream_id: 1,
            start_time: Utc::now(),
            end_time: None,
            status: "exploded".to_string(),
            path: "/x.ts".to_string(),
            duration_secs: None,
            used_proxy: false,
        };
        assert!(Recording::try_from(row).is_err());
    }
}
