//! Stream repository: live-session rows and episode numbering.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use sqlx::SqlitePool;

use crate::database::models::StreamRow;
use crate::domain::Stream;
use crate::{Error, Result};

/// Stream repository trait.
#[async_trait]
pub trait StreamRepository: Send + Sync {
    /// Return the streamer's live stream, creating one when none is open.
    ///
    /// Creation assigns the next monthly episode number in the same
    /// transaction so concurrent starts never share a number.
    #[allow(clippy::too_many_arguments)]
    async fn find_or_create_live_stream(
        &self,
        streamer_id: i64,
        started_at: DateTime<Utc>,
        twitch_stream_id: Option<&str>,
        title: Option<&str>,
        category_name: Option<&str>,
        language: Option<&str>,
    ) -> Result<Stream>;

    /// Close a stream. `ended_at` is written once; later calls with a
    /// different timestamp leave the stored value untouched.
    async fn end_stream(&self, stream_id: i64, ended_at: DateTime<Utc>) -> Result<Stream>;

    async fn get(&self, stream_id: i64) -> Result<Stream>;
    async fn find_live_by_streamer(&self, streamer_id: i64) -> Result<Option<Stream>>;
    async fn set_recording_path(&self, stream_id: i64, path: &str) -> Result<()>;
    async fn update_channel_info(
        &self,
        stream_id: i64,
        title: Option<&str>,
        category_name: Option<&str>,
        language: Option<&str>,
    ) -> Result<()>;
    async fn recent_by_streamer(&self, streamer_id: i64, limit: i64) -> Result<Vec<Stream>>;
    /// Next monthly episode number for the given calendar month.
    async fn episode_number(&self, streamer_id: i64, year: i32, month: u32) -> Result<i64>;
    async fn delete(&self, stream_id: i64) -> Result<()>;
}

/// SQLx implementation of StreamRepository.
pub struct SqlxStreamRepository {
    pool: SqlitePool,
}

impl SqlxStreamRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Half-open UTC interval covering one calendar month.
///
/// Bounds are bound as `DateTime` values so comparisons use the same
/// text encoding the rows were written with.
fn month_bounds(year: i32, month: u32) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let start = chrono::NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| Error::validation(format!("invalid month {year}-{month}")))?;
    let end = chrono::NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| Error::validation(format!("invalid month {next_year}-{next_month}")))?;
    Ok((start, end))
}

#[async_trait]
impl StreamRepository for SqlxStreamRepository {
    async fn find_or_create_live_stream(
        &self,
        streamer_id: i64,
        started_at: DateTime<Utc>,
        twitch_stream_id: Option<&str>,
        title: Option<&str>,
        category_name: Option<&str>,
        language: Option<&str>,
    ) -> Result<Stream> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, StreamRow>(
            "SELECT * FROM streams WHERE streamer_id = ? AND ended_at IS NULL",
        )
        .bind(streamer_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = existing {
            tx.commit().await?;
            return Ok(Stream::from(row));
        }

        let (lower, upper) = month_bounds(started_at.year(), started_at.month())?;
        let episode: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM streams \
             WHERE streamer_id = ? AND started_at >= ? AND started_at < ?",
        )
        .bind(streamer_id)
        .bind(lower)
        .bind(upper)
        .fetch_one(&mut *tx)
        .await?;

        let id = sqlx::query(
            "INSERT INTO streams \
             (streamer_id, twitch_stream_id, started_at, ended_at, title, category_name, \
              language, recording_path, episode_number) \
             VALUES (?, ?, ?, NULL, ?, ?, ?, NULL, ?)",
        )
        .bind(streamer_id)
        .bind(twitch_stream_id)
        .bind(started_at)
        .bind(title)
        .bind(category_name)
        .bind(language)
        .bind(episode + 1)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let row = sqlx::query_as::<_, StreamRow>("SELECT * FROM streams WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Stream::from(row))
    }

    async fn end_stream(&self, stream_id: i64, ended_at: DateTime<Utc>) -> Result<Stream> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, StreamRow>("SELECT * FROM streams WHERE id = ?")
            .bind(stream_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| Error::not_found("Stream", stream_id.to_string()))?;

        if row.ended_at.is_none() {
            let ended_at = ended_at.max(row.started_at);
            sqlx::query("UPDATE streams SET ended_at = ? WHERE id = ?")
                .bind(ended_at)
                .bind(stream_id)
                .execute(&mut *tx)
                .await?;
        }

        let row = sqlx::query_as::<_, StreamRow>("SELECT * FROM streams WHERE id = ?")
            .bind(stream_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Stream::from(row))
    }

    async fn get(&self, stream_id: i64) -> Result<Stream> {
        sqlx::query_as::<_, StreamRow>("SELECT * FROM streams WHERE id = ?")
            .bind(stream_id)
            .fetch_optional(&self.pool)
            .await?
            .map(Stream::from)
            .ok_or_else(|| Error::not_found("Stream", stream_id.to_string()))
    }

    async fn find_live_by_streamer(&self, streamer_id: i64) -> Result<Option<Stream>> {
        let row = sqlx::query_as::<_, StreamRow>(
            "SELECT * FROM streams WHERE streamer_id = ? AND ended_at IS NULL",
        )
        .bind(streamer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Stream::from))
    }

    async fn set_recording_path(&self, stream_id: i64, path: &str) -> Result<()> {
        sqlx::query("UPDATE streams SET recording_path = ? WHERE id = ?")
            .bind(path)
            .bind(stream_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_channel_info(
        &self,
        stream_id: i64,
        title: Option<&str>,
        category_name: Option<&str>,
        language: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE streams SET \
             title = COALESCE(?, title), \
             category_name = COALESCE(?, category_name), \
             language = COALESCE(?, language) \
             WHERE id = ?",
        )
        .bind(title)
        .bind(category_name)
        .bind(language)
        .bind(stream_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_by_streamer(&self, streamer_id: i64, limit: i64) -> Result<Vec<Stream>> {
        let rows = sqlx::query_as::<_, StreamRow>(
            "SELECT * FROM streams WHERE streamer_id = ? ORDER BY started_at DESC LIMIT ?",
        )
        .bind(streamer_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Stream::from).collect())
    }

    async fn episode_number(&self, streamer_id: i64, year: i32, month: u32) -> Result<i64> {
        let (lower, upper) = month_bounds(year, month)?;
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM streams \
             WHERE streamer_id = ? AND started_at >= ? AND started_at < ?",
        )
        .bind(streamer_id)
        .bind(lower)
        .bind(upper)
        .fetch_one(&self.pool)
        .await?;
        Ok(count + 1)
    }

    async fn delete(&self, stream_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM streams WHERE id = ?")
            .bind(stream_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Stream", stream_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_month_bounds_rollover() {
        let (lower, upper) = month_bounds(2025, 12).unwrap();
        assert_eq!(lower, Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap());
        assert_eq!(upper, Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());

        let (lower, upper) = month_bounds(2025, 1).unwrap();
        assert_eq!(lower, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(upper, Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_month_bounds_rejects_bad_month() {
        assert!(month_bounds(2025, 13).is_err());
    }
}
