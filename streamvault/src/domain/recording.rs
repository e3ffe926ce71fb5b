//! Capture attempt entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::RecordingStatus;

/// One attempt to capture a stream to disk.
///
/// At most one recording per stream has status `recording`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: i64,
    pub stream_id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RecordingStatus,
    /// Path of the `.ts` intermediate (later the `.mp4`).
    pub path: String,
    /// Capture duration in seconds, once known.
    pub duration_secs: Option<f64>,
    /// Whether the capture ran through a proxy. Pinned at spawn time;
    /// validation picks its threshold regime from this, not from the
    /// proxy settings in effect when the pipeline runs.
    pub used_proxy: bool,
}

impl Recording {
    pub fn is_active(&self) -> bool {
        self.status == RecordingStatus::Recording
    }

    /// The `.ts` intermediate path for this recording.
    pub fn ts_path(&self) -> String {
        if self.path.ends_with(".mp4") {
            format!("{}.ts", self.path.trim_end_matches(".mp4"))
        } else {
            self.path.clone()
        }
    }

    /// The `.mp4` sibling path for this recording.
    pub fn mp4_path(&self) -> String {
        if self.path.ends_with(".ts") {
            format!("{}.mp4", self.path.trim_end_matches(".ts"))
        } else {
            self.path.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_paths() {
        let rec = Recording {
            id: 1,
            stream_id: 2,
            start_time: Utc::now(),
            end_time: None,
            status: RecordingStatus::Recording,
            path: "/rec/alice/ep1.ts".to_string(),
            duration_secs: None,
            used_proxy: false,
        };
        assert_eq!(rec.ts_path(), "/rec/alice/ep1.ts");
        assert_eq!(rec.mp4_path(), "/rec/alice/ep1.mp4");
        assert!(rec.is_active());
    }
}
