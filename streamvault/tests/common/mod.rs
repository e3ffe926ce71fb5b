//! Shared fixtures for integration tests.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;

use streamvault::database;
use streamvault::database::repositories::{
    SqlxStreamRepository, SqlxStreamerRepository, StreamRepository, StreamerRepository,
};
use streamvault::domain::{Stream, Streamer};

/// A migrated pool backed by a temp file (shared across connections).
pub async fn test_pool() -> (SqlitePool, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let url = format!(
        "sqlite:{}?mode=rwc",
        dir.path().join("test.db").to_string_lossy()
    );
    let pool = database::init_pool(&url).await.expect("init pool");
    (pool, dir)
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 2, 10, 0, 0).unwrap()
}

pub async fn seed_streamer(pool: &SqlitePool, username: &str, twitch_id: &str) -> Streamer {
    let repo = SqlxStreamerRepository::new(pool.clone());
    repo.create(&Streamer {
        id: 0,
        twitch_id: twitch_id.to_string(),
        username: username.to_string(),
        display_name: username.to_string(),
        profile_image_url: None,
        title: Some("Test title".to_string()),
        category_name: Some("Tetris".to_string()),
        language: Some("en".to_string()),
        is_live: false,
        recording_enabled: true,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    })
    .await
    .expect("seed streamer")
}

pub async fn seed_live_stream(pool: &SqlitePool, streamer: &Streamer) -> Stream {
    let repo = SqlxStreamRepository::new(pool.clone());
    repo.find_or_create_live_stream(
        streamer.id,
        t0(),
        Some("s42"),
        Some("Test title"),
        Some("Tetris"),
        Some("en"),
    )
    .await
    .expect("seed stream")
}
