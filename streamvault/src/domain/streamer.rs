//! Broadcaster identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A broadcaster known to the system.
///
/// Created on explicit add, deleted on explicit remove; children
/// (streams, recordings, events, metadata) cascade on delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Streamer {
    /// Internal id (database key).
    pub id: i64,
    /// Twitch user id.
    pub twitch_id: String,
    /// Login name (lowercase, used in URLs and file paths).
    pub username: String,
    /// Display name as shown on Twitch.
    pub display_name: String,
    /// Cached profile image reference.
    pub profile_image_url: Option<String>,
    /// Last known stream title.
    pub title: Option<String>,
    /// Last known category/game name.
    pub category_name: Option<String>,
    /// Last known broadcast language.
    pub language: Option<String>,
    /// Whether Twitch currently reports the streamer live.
    pub is_live: bool,
    /// Whether automatic recording is enabled.
    pub recording_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Streamer {
    /// Directory-safe name used as the root of this streamer's recordings.
    pub fn safe_name(&self) -> String {
        crate::layout::sanitize_segment(&self.username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_name_strips_illegal_characters() {
        let streamer = Streamer {
            id: 1,
            twitch_id: "111".to_string(),
            username: "al/ice:<>".to_string(),
            display_name: "Alice".to_string(),
            profile_image_url: None,
            title: None,
            category_name: None,
            language: None,
            is_live: false,
            recording_enabled: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(streamer.safe_name(), "al_ice");
    }
}
