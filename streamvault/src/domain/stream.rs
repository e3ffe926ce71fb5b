//! Live session entity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One contiguous live session of a streamer.
///
/// At most one stream per streamer has `ended_at = None`. Once
/// `ended_at` is set it never changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub id: i64,
    pub streamer_id: i64,
    /// Twitch stream id; `None` only for force-started sessions until a
    /// synthetic `force_<unix>` id is assigned.
    pub twitch_stream_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub category_name: Option<String>,
    pub language: Option<String>,
    /// Final media path, set when post-processing completes.
    pub recording_path: Option<String>,
    /// Episode number within the month of `started_at`.
    pub episode_number: i64,
}

impl Stream {
    /// Whether the session is still live.
    pub fn is_live(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Session duration in seconds, if ended.
    pub fn duration_secs(&self) -> Option<f64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds() as f64 / 1000.0)
    }

    /// Season label in the `YYYYMM` scheme used by episode NFOs.
    pub fn season_number(&self) -> i64 {
        let date = self.started_at.date_naive();
        use chrono::Datelike;
        (date.year() as i64) * 100 + date.month() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stream_at(started: DateTime<Utc>, ended: Option<DateTime<Utc>>) -> Stream {
        Stream {
            id: 1,
            streamer_id: 7,
            twitch_stream_id: Some("s42".to_string()),
            started_at: started,
            ended_at: ended,
            title: Some("title".to_string()),
            category_name: None,
            language: None,
            recording_path: None,
            episode_number: 1,
        }
    }

    #[test]
    fn test_duration() {
        let start = Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 2, 10, 30, 0).unwrap();
        let stream = stream_at(start, Some(end));
        assert_eq!(stream.duration_secs(), Some(1800.0));
        assert!(!stream.is_live());
    }

    #[test]
    fn test_season_number() {
        let start = Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap();
        assert_eq!(stream_at(start, None).season_number(), 202501);
    }
}
