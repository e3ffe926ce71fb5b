//! Shared domain enums with database string representations.

use serde::{Deserialize, Serialize};

/// Status of a recording attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    /// Capture child is running (or believed to be).
    Recording,
    /// Capture ended and the file was handed to the pipeline.
    Completed,
    /// Capture failed before producing a usable file.
    Failed,
    /// Capture was cancelled by an operator.
    Cancelled,
}

impl RecordingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recording => "recording",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "recording" => Some(Self::Recording),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Recording)
    }
}

impl std::fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The six post-processing steps tracked per recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStep {
    Mp4Remux,
    Mp4Validation,
    Metadata,
    Chapters,
    Thumbnail,
    Cleanup,
}

impl ProcessingStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp4Remux => "mp4_remux",
            Self::Mp4Validation => "mp4_validation",
            Self::Metadata => "metadata",
            Self::Chapters => "chapters",
            Self::Thumbnail => "thumbnail",
            Self::Cleanup => "cleanup",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "mp4_remux" => Some(Self::Mp4Remux),
            "mp4_validation" => Some(Self::Mp4Validation),
            "metadata" => Some(Self::Metadata),
            "chapters" => Some(Self::Chapters),
            "thumbnail" => Some(Self::Thumbnail),
            "cleanup" => Some(Self::Cleanup),
            _ => None,
        }
    }

    /// All steps in DAG order.
    pub fn all() -> [ProcessingStep; 6] {
        [
            Self::Mp4Remux,
            Self::Mp4Validation,
            Self::Metadata,
            Self::Chapters,
            Self::Thumbnail,
            Self::Cleanup,
        ]
    }

    /// Declared predecessors of this step in the pipeline DAG.
    pub fn predecessors(&self) -> &'static [ProcessingStep] {
        match self {
            Self::Mp4Remux => &[],
            Self::Mp4Validation => &[Self::Mp4Remux],
            Self::Metadata => &[Self::Mp4Validation],
            Self::Chapters => &[Self::Mp4Validation],
            Self::Thumbnail => &[Self::Metadata, Self::Chapters],
            Self::Cleanup => &[Self::Thumbnail],
        }
    }
}

impl std::fmt::Display for ProcessingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-step progress state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "skipped" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// A successor step may start once this step reached one of these.
    pub fn satisfies_dependency(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of a timestamped stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamEventKind {
    Online,
    Offline,
    ChannelUpdate,
}

impl StreamEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "stream.online",
            Self::Offline => "stream.offline",
            Self::ChannelUpdate => "channel.update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stream.online" => Some(Self::Online),
            "stream.offline" => Some(Self::Offline),
            "channel.update" => Some(Self::ChannelUpdate),
            _ => None,
        }
    }
}

impl std::fmt::Display for StreamEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_status_round_trip() {
        for status in [
            RecordingStatus::Recording,
            RecordingStatus::Completed,
            RecordingStatus::Failed,
            RecordingStatus::Cancelled,
        ] {
            assert_eq!(RecordingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RecordingStatus::parse("bogus"), None);
    }

    #[test]
    fn test_only_recording_is_non_terminal() {
        assert!(!RecordingStatus::Recording.is_terminal());
        assert!(RecordingStatus::Completed.is_terminal());
        assert!(RecordingStatus::Failed.is_terminal());
        assert!(RecordingStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_step_predecessors() {
        assert!(ProcessingStep::Mp4Remux.predecessors().is_empty());
        assert_eq!(
            ProcessingStep::Mp4Validation.predecessors(),
            &[ProcessingStep::Mp4Remux]
        );
        assert_eq!(
            ProcessingStep::Thumbnail.predecessors(),
            &[ProcessingStep::Metadata, ProcessingStep::Chapters]
        );
    }

    #[test]
    fn test_step_status_dependency_satisfaction() {
        assert!(StepStatus::Completed.satisfies_dependency());
        assert!(StepStatus::Skipped.satisfies_dependency());
        assert!(!StepStatus::Pending.satisfies_dependency());
        assert!(!StepStatus::Running.satisfies_dependency());
        assert!(!StepStatus::Failed.satisfies_dependency());
    }

    #[test]
    fn test_event_kind_parse() {
        assert_eq!(
            StreamEventKind::parse("channel.update"),
            Some(StreamEventKind::ChannelUpdate)
        );
        assert_eq!(StreamEventKind::parse("channel.follow"), None);
    }
}
