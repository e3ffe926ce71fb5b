//! WebSocket message envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire shape of every outbound WebSocket message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    pub fn connection_status(data: Value) -> Self {
        Self::new("connection.status", data)
    }

    pub fn recording_started(data: Value) -> Self {
        Self::new("recording_started", data)
    }

    pub fn recording_stopped(data: Value) -> Self {
        Self::new("recording_stopped", data)
    }

    pub fn recording_available(data: Value) -> Self {
        Self::new("recording_available", data)
    }

    pub fn recording_processing_status(data: Value) -> Self {
        Self::new("recording_processing_status", data)
    }

    pub fn active_recordings_update(data: Value) -> Self {
        Self::new("active_recordings_update", data)
    }

    pub fn queue_stats_update(data: Value) -> Self {
        Self::new("queue_stats_update", data)
    }

    pub fn task_progress_update(data: Value) -> Self {
        Self::new("task_progress_update", data)
    }

    /// Toast shown for streamer-attributable failures.
    pub fn toast(data: Value) -> Self {
        Self::new("toast", data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let envelope = Envelope::recording_started(json!({"recording_id": 3}));
        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(wire["type"], "recording_started");
        assert_eq!(wire["data"]["recording_id"], 3);
        assert!(wire["timestamp"].is_string());
    }
}
