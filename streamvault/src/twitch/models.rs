//! Helix response models.

use serde::{Deserialize, Serialize};

/// Generic Helix data envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct HelixPage<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitchUser {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(default)]
    pub profile_image_url: String,
    #[serde(default)]
    pub offline_image_url: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitchStream {
    pub id: String,
    pub user_id: String,
    pub user_login: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub language: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub viewer_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitchGame {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub box_art_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventSubSubscription {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppAccessToken {
    pub access_token: String,
    pub expires_in: u64,
}
