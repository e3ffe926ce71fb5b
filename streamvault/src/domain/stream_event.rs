//! Timestamped facts about a stream, the source of chapter boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::StreamEventKind;

/// A timestamped fact about a stream.
///
/// Events are ordered strictly by timestamp within a stream. Events
/// with a timestamp before `stream.started_at` are clamped to the start
/// when rendering chapters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    pub id: i64,
    pub stream_id: i64,
    pub kind: StreamEventKind,
    pub timestamp: DateTime<Utc>,
    pub title: Option<String>,
    pub category_name: Option<String>,
    pub language: Option<String>,
}

impl StreamEvent {
    /// Offset of this event into the stream, clamped to zero for
    /// pre-stream events.
    pub fn offset_secs(&self, started_at: DateTime<Utc>) -> f64 {
        let delta = (self.timestamp - started_at).num_milliseconds() as f64 / 1000.0;
        delta.max(0.0)
    }

    /// Chapter title for this event: the stream title, falling back to
    /// the category name.
    pub fn chapter_title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.category_name.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_pre_stream_offset_clamped() {
        let started = Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap();
        let event = StreamEvent {
            id: 1,
            stream_id: 1,
            kind: StreamEventKind::ChannelUpdate,
            timestamp: started - chrono::Duration::minutes(5),
            title: Some("early".to_string()),
            category_name: None,
            language: None,
        };
        assert_eq!(event.offset_secs(started), 0.0);
    }

    #[test]
    fn test_chapter_title_fallback() {
        let event = StreamEvent {
            id: 1,
            stream_id: 1,
            kind: StreamEventKind::ChannelUpdate,
            timestamp: Utc::now(),
            title: Some(String::new()),
            category_name: Some("Just Chatting".to_string()),
            language: None,
        };
        assert_eq!(event.chapter_title(), Some("Just Chatting"));
    }
}
