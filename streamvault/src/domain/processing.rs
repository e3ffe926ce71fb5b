//! Per-recording pipeline progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{ProcessingStep, StepStatus};

/// Progress of the post-processing pipeline for one recording.
///
/// A step enters `running` only when all its declared predecessors are
/// `completed` or `skipped`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingState {
    pub recording_id: i64,
    pub metadata: StepStatus,
    pub chapters: StepStatus,
    pub mp4_remux: StepStatus,
    pub mp4_validation: StepStatus,
    pub thumbnail: StepStatus,
    pub cleanup: StepStatus,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingState {
    pub fn new(recording_id: i64) -> Self {
        Self {
            recording_id,
            metadata: StepStatus::Pending,
            chapters: StepStatus::Pending,
            mp4_remux: StepStatus::Pending,
            mp4_validation: StepStatus::Pending,
            thumbnail: StepStatus::Pending,
            cleanup: StepStatus::Pending,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn step(&self, step: ProcessingStep) -> StepStatus {
        match step {
            ProcessingStep::Metadata => self.metadata,
            ProcessingStep::Chapters => self.chapters,
            ProcessingStep::Mp4Remux => self.mp4_remux,
            ProcessingStep::Mp4Validation => self.mp4_validation,
            ProcessingStep::Thumbnail => self.thumbnail,
            ProcessingStep::Cleanup => self.cleanup,
        }
    }

    pub fn set_step(&mut self, step: ProcessingStep, status: StepStatus) {
        let slot = match step {
            ProcessingStep::Metadata => &mut self.metadata,
            ProcessingStep::Chapters => &mut self.chapters,
            ProcessingStep::Mp4Remux => &mut self.mp4_remux,
            ProcessingStep::Mp4Validation => &mut self.mp4_validation,
            ProcessingStep::Thumbnail => &mut self.thumbnail,
            ProcessingStep::Cleanup => &mut self.cleanup,
        };
        *slot = status;
        self.updated_at = Utc::now();
    }

    /// Whether `step` may transition to `running` given its predecessors.
    pub fn can_start(&self, step: ProcessingStep) -> bool {
        step.predecessors()
            .iter()
            .all(|p| self.step(*p).satisfies_dependency())
    }

    /// Whether every step reached a terminal status.
    pub fn is_finished(&self) -> bool {
        ProcessingStep::all().iter().all(|s| {
            matches!(
                self.step(*s),
                StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predecessor_gate() {
        let mut state = ProcessingState::new(1);
        assert!(state.can_start(ProcessingStep::Mp4Remux));
        assert!(!state.can_start(ProcessingStep::Mp4Validation));

        state.set_step(ProcessingStep::Mp4Remux, StepStatus::Completed);
        assert!(state.can_start(ProcessingStep::Mp4Validation));

        // Thumbnail needs both metadata and chapters.
        state.set_step(ProcessingStep::Mp4Validation, StepStatus::Completed);
        state.set_step(ProcessingStep::Metadata, StepStatus::Completed);
        assert!(!state.can_start(ProcessingStep::Thumbnail));
        state.set_step(ProcessingStep::Chapters, StepStatus::Skipped);
        assert!(state.can_start(ProcessingStep::Thumbnail));
    }

    #[test]
    fn test_is_finished() {
        let mut state = ProcessingState::new(1);
        assert!(!state.is_finished());
        for step in ProcessingStep::all() {
            state.set_step(step, StepStatus::Skipped);
        }
        assert!(state.is_finished());
    }
}
