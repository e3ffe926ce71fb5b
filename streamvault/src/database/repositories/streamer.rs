//! Streamer repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::database::models::StreamerRow;
use crate::domain::Streamer;
use crate::{Error, Result};

/// Streamer repository trait.
#[async_trait]
pub trait StreamerRepository: Send + Sync {
    async fn get(&self, id: i64) -> Result<Streamer>;
    async fn get_by_twitch_id(&self, twitch_id: &str) -> Result<Option<Streamer>>;
    async fn get_by_username(&self, username: &str) -> Result<Option<Streamer>>;
    async fn list(&self) -> Result<Vec<Streamer>>;
    async fn list_live(&self) -> Result<Vec<Streamer>>;
    async fn create(&self, streamer: &Streamer) -> Result<Streamer>;
    async fn update_channel_info(
        &self,
        id: i64,
        title: Option<&str>,
        category_name: Option<&str>,
        language: Option<&str>,
    ) -> Result<()>;
    async fn set_live(&self, id: i64, is_live: bool) -> Result<()>;
    async fn set_recording_enabled(&self, id: i64, enabled: bool) -> Result<()>;
    async fn update_profile_image(&self, id: i64, url: Option<&str>) -> Result<()>;
    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx implementation of StreamerRepository.
pub struct SqlxStreamerRepository {
    pool: SqlitePool,
}

impl SqlxStreamerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreamerRepository for SqlxStreamerRepository {
    async fn get(&self, id: i64) -> Result<Streamer> {
        sqlx::query_as::<_, StreamerRow>("SELECT * FROM streamers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Streamer::from)
            .ok_or_else(|| Error::not_found("Streamer", id.to_string()))
    }

    async fn get_by_twitch_id(&self, twitch_id: &str) -> Result<Option<Streamer>> {
        let row = sqlx::query_as::<_, StreamerRow>("SELECT * FROM streamers WHERE twitch_id = ?")
            .bind(twitch_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Streamer::from))
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<Streamer>> {
        let row = sqlx::query_as::<_, StreamerRow>("SELECT * FROM streamers WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Streamer::from))
    }

    async fn list(&self) -> Result<Vec<Streamer>> {
        let rows = sqlx::query_as::<_, StreamerRow>("SELECT * FROM streamers ORDER BY username")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Streamer::from).collect())
    }

    async fn list_live(&self) -> Result<Vec<Streamer>> {
        let rows = sqlx::query_as::<_, StreamerRow>(
            "SELECT * FROM streamers WHERE is_live = 1 ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Streamer::from).collect())
    }

    async fn create(&self, streamer: &Streamer) -> Result<Streamer> {
        let now = Utc::now();
        let id = sqlx::query(
            "INSERT INTO streamers \
             (twitch_id, username, display_name, profile_image_url, title, category_name, \
              language, is_live, recording_enabled, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&streamer.twitch_id)
        .bind(&streamer.username)
        .bind(&streamer.display_name)
        .bind(&streamer.profile_image_url)
        .bind(&streamer.title)
        .bind(&streamer.category_name)
        .bind(&streamer.language)
        .bind(streamer.is_live)
        .bind(streamer.recording_enabled)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        self.get(id).await
    }

    async fn update_channel_info(
        &self,
        id: i64,
        title: Option<&str>,
        category_name: Option<&str>,
        language: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE streamers SET \
             title = COALESCE(?, title), \
             category_name = COALESCE(?, category_name), \
             language = COALESCE(?, language), \
             updated_at = ? \
             WHERE id = ?",
        )
        .bind(title)
        .bind(category_name)
        .bind(language)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_live(&self, id: i64, is_live: bool) -> Result<()> {
        sqlx::query("UPDATE streamers SET is_live = ?, updated_at = ? WHERE id = ?")
            .bind(is_live)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_recording_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE streamers SET recording_enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_profile_image(&self, id: i64, url: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE streamers SET profile_image_url = ?, updated_at = ? WHERE id = ?")
            .bind(url)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM streamers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Streamer", id.to_string()));
        }
        Ok(())
    }
}
