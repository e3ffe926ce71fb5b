//! Settings repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::{GlobalSettingsRow, StreamerRecordingSettingsRow};
use crate::domain::{GlobalSettings, StreamerRecordingSettings};
use crate::Result;

/// Settings repository trait.
#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn global(&self) -> Result<GlobalSettings>;
    async fn update_global(&self, settings: &GlobalSettings) -> Result<()>;
    async fn streamer_overrides(&self, streamer_id: i64)
        -> Result<Option<StreamerRecordingSettings>>;
    async fn upsert_streamer_overrides(&self, settings: &StreamerRecordingSettings) -> Result<()>;
}

/// SQLx implementation of SettingsRepository.
pub struct SqlxSettingsRepository {
    pool: SqlitePool,
}

impl SqlxSettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsRepository for SqlxSettingsRepository {
    async fn global(&self) -> Result<GlobalSettings> {
        let row =
            sqlx::query_as::<_, GlobalSettingsRow>("SELECT * FROM global_settings WHERE id = 1")
                .fetch_one(&self.pool)
                .await?;
        Ok(GlobalSettings::from(row))
    }

    async fn update_global(&self, settings: &GlobalSettings) -> Result<()> {
        sqlx::query(
            "UPDATE global_settings SET \
             default_quality = ?, supported_codecs = ?, filename_template = ?, \
             http_proxy = ?, https_proxy = ?, proxy_preflight = ?, \
             max_streams_per_streamer = ?, max_concurrent_recordings = ?, \
             oauth_token = ?, strict_no_proxy_validation = ?, recordings_root = ?, \
             log_filter_directive = ? \
             WHERE id = 1",
        )
        .bind(&settings.default_quality)
        .bind(settings.supported_codecs.join(","))
        .bind(&settings.filename_template)
        .bind(&settings.http_proxy)
        .bind(&settings.https_proxy)
        .bind(settings.proxy_preflight)
        .bind(settings.max_streams_per_streamer)
        .bind(settings.max_concurrent_recordings as i64)
        .bind(&settings.oauth_token)
        .bind(settings.strict_no_proxy_validation)
        .bind(&settings.recordings_root)
        .bind(&settings.log_filter_directive)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn streamer_overrides(
        &self,
        streamer_id: i64,
    ) -> Result<Option<StreamerRecordingSettings>> {
        let row = sqlx::query_as::<_, StreamerRecordingSettingsRow>(
            "SELECT * FROM streamer_recording_settings WHERE streamer_id = ?",
        )
        .bind(streamer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(StreamerRecordingSettings::from))
    }

    async fn upsert_streamer_overrides(
        &self,
        settings: &StreamerRecordingSettings,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO streamer_recording_settings \
             (streamer_id, quality, supported_codecs, filename_template, http_proxy, \
              https_proxy, max_streams, oauth_token) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(streamer_id) DO UPDATE SET \
             quality = excluded.quality, \
             supported_codecs = excluded.supported_codecs, \
             filename_template = excluded.filename_template, \
             http_proxy = excluded.http_proxy, \
             https_proxy = excluded.https_proxy, \
             max_streams = excluded.max_streams, \
             oauth_token = excluded.oauth_token",
        )
        .bind(settings.streamer_id)
        .bind(&settings.quality)
        .bind(settings.supported_codecs.as_ref().map(|c| c.join(",")))
        .bind(&settings.filename_template)
        .bind(&settings.http_proxy)
        .bind(&settings.https_proxy)
        .bind(settings.max_streams)
        .bind(&settings.oauth_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
