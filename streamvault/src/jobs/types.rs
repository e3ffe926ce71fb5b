//! Task model for the background job queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::JobRow;
use crate::{Error, Result};

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Skipped,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::Skipped
        )
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kinds of background tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Mp4Remux,
    Mp4Validation,
    MetadataGen,
    ChaptersGen,
    Thumbnail,
    Cleanup,
    /// Remove every artefact of a deleted stream.
    StreamDeletion,
    /// Delayed live preview download while a capture runs.
    LivePreview,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp4Remux => "mp4_remux",
            Self::Mp4Validation => "mp4_validation",
            Self::MetadataGen => "metadata_gen",
            Self::ChaptersGen => "chapters_gen",
            Self::Thumbnail => "thumbnail",
            Self::Cleanup => "cleanup",
            Self::StreamDeletion => "stream_deletion",
            Self::LivePreview => "live_preview",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mp4_remux" => Some(Self::Mp4Remux),
            "mp4_validation" => Some(Self::Mp4Validation),
            "metadata_gen" => Some(Self::MetadataGen),
            "chapters_gen" => Some(Self::ChaptersGen),
            "thumbnail" => Some(Self::Thumbnail),
            "cleanup" => Some(Self::Cleanup),
            "stream_deletion" => Some(Self::StreamDeletion),
            "live_preview" => Some(Self::LivePreview),
            _ => None,
        }
    }

    /// Per-kind concurrency cap. Remux is ffmpeg-heavy and limited to 2.
    pub fn concurrency_cap(&self) -> usize {
        match self {
            Self::Mp4Remux => 2,
            _ => usize::MAX,
        }
    }

    /// Default priority: fresh pipeline work outranks cleanup, cleanup
    /// outranks housekeeping kinds.
    pub fn default_priority(&self) -> i32 {
        match self {
            Self::Mp4Remux | Self::Mp4Validation | Self::MetadataGen | Self::ChaptersGen
            | Self::Thumbnail => 100,
            Self::Cleanup | Self::StreamDeletion => 50,
            Self::LivePreview => 10,
        }
    }

    pub fn default_max_attempts(&self) -> u32 {
        match self {
            // Validation is deterministic on its inputs.
            Self::Mp4Validation => 1,
            Self::LivePreview => 2,
            _ => 3,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A task in the queue.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub priority: i32,
    pub payload: Value,
    pub depends_on: Vec<String>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub state: TaskState,
    pub progress: f64,
    /// Correlation key for pipeline tasks.
    pub recording_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Earliest time the task may be dequeued (backoff / delayed tasks).
    pub not_before: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Task {
    pub fn new(kind: TaskKind, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            priority: kind.default_priority(),
            payload,
            depends_on: Vec::new(),
            attempts: 0,
            max_attempts: kind.default_max_attempts(),
            state: TaskState::Queued,
            progress: 0.0,
            recording_id: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            not_before: None,
            last_error: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_recording(mut self, recording_id: i64) -> Self {
        self.recording_id = Some(recording_id);
        self
    }

    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.push(dep.into());
        self
    }

    pub fn with_not_before(mut self, at: DateTime<Utc>) -> Self {
        self.not_before = Some(at);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

impl TryFrom<JobRow> for Task {
    type Error = Error;

    fn try_from(row: JobRow) -> Result<Self> {
        let kind = TaskKind::parse(&row.kind)
            .ok_or_else(|| Error::database(format!("unknown task kind: {}", row.kind)))?;
        let state = TaskState::parse(&row.state)
            .ok_or_else(|| Error::database(format!("unknown task state: {}", row.state)))?;
        Ok(Self {
            id: row.id,
            kind,
            priority: row.priority as i32,
            payload: serde_json::from_str(&row.payload)?,
            depends_on: Vec::new(),
            attempts: row.attempts.max(0) as u32,
            max_attempts: row.max_attempts.max(1) as u32,
            state,
            progress: row.progress,
            recording_id: row.recording_id,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            not_before: row.not_before,
            last_error: row.last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            TaskKind::Mp4Remux,
            TaskKind::Mp4Validation,
            TaskKind::MetadataGen,
            TaskKind::ChaptersGen,
            TaskKind::Thumbnail,
            TaskKind::Cleanup,
            TaskKind::StreamDeletion,
            TaskKind::LivePreview,
        ] {
            assert_eq!(TaskKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_priority_ordering_pipeline_over_cleanup() {
        assert!(TaskKind::Mp4Remux.default_priority() > TaskKind::Cleanup.default_priority());
        assert!(TaskKind::Cleanup.default_priority() > TaskKind::LivePreview.default_priority());
    }

    #[test]
    fn test_builder() {
        let task = Task::new(TaskKind::Mp4Remux, json!({"recording_id": 3}))
            .with_recording(3)
            .with_dependency("parent-id")
            .with_priority(200);
        assert_eq!(task.recording_id, Some(3));
        assert_eq!(task.depends_on, vec!["parent-id".to_string()]);
        assert_eq!(task.priority, 200);
        assert_eq!(task.state, TaskState::Queued);
    }
}
