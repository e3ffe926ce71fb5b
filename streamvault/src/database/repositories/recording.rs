//! Recording repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::models::RecordingRow;
use crate::domain::types::RecordingStatus;
use crate::domain::Recording;
use crate::{Error, Result};

/// Fields that may change after a recording row is created.
#[derive(Debug, Clone, Default)]
pub struct RecordingUpdate {
    pub status: Option<RecordingStatus>,
    pub end_time: Option<DateTime<Utc>>,
    pub path: Option<String>,
    pub duration_secs: Option<f64>,
}

/// Recording repository trait.
#[async_trait]
pub trait RecordingRepository: Send + Sync {
    /// Create a recording in `recording` state. `used_proxy` records
    /// the capture regime for later validation. Fails with
    /// `RecordingAlreadyActive` when the stream already has one.
    async fn create(
        &self,
        stream_id: i64,
        start_time: DateTime<Utc>,
        path: &str,
        used_proxy: bool,
    ) -> Result<Recording>;

    async fn update(&self, id: i64, update: RecordingUpdate) -> Result<Recording>;
    async fn get(&self, id: i64) -> Result<Recording>;
    async fn find_active_by_stream(&self, stream_id: i64) -> Result<Option<Recording>>;
    async fn list_by_stream(&self, stream_id: i64) -> Result<Vec<Recording>>;
    /// All rows still marked `recording`; at startup these are orphans.
    async fn list_orphaned(&self) -> Result<Vec<Recording>>;
    async fn active_count(&self) -> Result<i64>;
}

/// SQLx implementation of RecordingRepository.
pub struct SqlxRecordingRepository {
    pool: SqlitePool,
}

impl SqlxRecordingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordingRepository for SqlxRecordingRepository {
    async fn create(
        &self,
        stream_id: i64,
        start_time: DateTime<Utc>,
        path: &str,
        used_proxy: bool,
    ) -> Result<Recording> {
        let mut tx = self.pool.begin().await?;

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM recordings WHERE stream_id = ? AND status = 'recording'",
        )
        .bind(stream_id)
        .fetch_one(&mut *tx)
        .await?;
        if active > 0 {
            return Err(Error::RecordingAlreadyActive(stream_id.to_string()));
        }

        let id = sqlx::query(
            "INSERT INTO recordings \
             (stream_id, start_time, end_time, status, path, duration_secs, used_proxy) \
             VALUES (?, ?, NULL, 'recording', ?, NULL, ?)",
        )
        .bind(stream_id)
        .bind(start_time)
        .bind(path)
        .bind(used_proxy)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let row = sqlx::query_as::<_, RecordingRow>("SELECT * FROM recordings WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Recording::try_from(row)
    }

    async fn update(&self, id: i64, update: RecordingUpdate) -> Result<Recording> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, RecordingRow>("SELECT * FROM recordings WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::not_found("Recording", id.to_string()))?;
        let current = Recording::try_from(row)?;

        // Terminal statuses never revert to `recording`.
        let status = match update.status {
            Some(RecordingStatus::Recording) if current.status.is_terminal() => current.status,
            Some(status) => status,
            None => current.status,
        };

        sqlx::query(
            "UPDATE recordings SET status = ?, end_time = COALESCE(?, end_time), \
             path = COALESCE(?, path), duration_secs = COALESCE(?, duration_secs) \
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(update.end_time)
        .bind(update.path)
        .bind(update.duration_secs)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, RecordingRow>("SELECT * FROM recordings WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Recording::try_from(row)
    }

    async fn get(&self, id: i64) -> Result<Recording> {
        let row = sqlx::query_as::<_, RecordingRow>("SELECT * FROM recordings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Recording", id.to_string()))?;
        Recording::try_from(row)
    }

    async fn find_active_by_stream(&self, stream_id: i64) -> Result<Option<Recording>> {
        let row = sqlx::query_as::<_, RecordingRow>(
            "SELECT * FROM recordings WHERE stream_id = ? AND status = 'recording'",
        )
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Recording::try_from).transpose()
    }

    async fn list_by_stream(&self, stream_id: i64) -> Result<Vec<Recording>> {
        let rows = sqlx::query_as::<_, RecordingRow>(
            "SELECT * FROM recordings WHERE stream_id = ? ORDER BY start_time",
        )
        .bind(stream_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Recording::try_from).collect()
    }

    async fn list_orphaned(&self) -> Result<Vec<Recording>> {
        let rows = sqlx::query_as::<_, RecordingRow>(
            "SELECT * FROM recordings WHERE status = 'recording' ORDER BY start_time",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Recording::try_from).collect()
    }

    async fn active_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM recordings WHERE status = 'recording'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
