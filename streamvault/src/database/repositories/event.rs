//! Stream event repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::models::StreamEventRow;
use crate::domain::types::StreamEventKind;
use crate::domain::StreamEvent;
use crate::Result;

/// Stream event repository trait.
#[async_trait]
pub trait StreamEventRepository: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    async fn append(
        &self,
        stream_id: i64,
        kind: StreamEventKind,
        timestamp: DateTime<Utc>,
        title: Option<&str>,
        category_name: Option<&str>,
        language: Option<&str>,
    ) -> Result<StreamEvent>;

    /// Events of a stream, strictly ordered by timestamp.
    async fn list_by_stream(&self, stream_id: i64) -> Result<Vec<StreamEvent>>;
}

/// SQLx implementation of StreamEventRepository.
pub struct SqlxStreamEventRepository {
    pool: SqlitePool,
}

impl SqlxStreamEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreamEventRepository for SqlxStreamEventRepository {
    async fn append(
        &self,
        stream_id: i64,
        kind: StreamEventKind,
        timestamp: DateTime<Utc>,
        title: Option<&str>,
        category_name: Option<&str>,
        language: Option<&str>,
    ) -> Result<StreamEvent> {
        let id = sqlx::query(
            "INSERT INTO stream_events (stream_id, kind, timestamp, title, category_name, language) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(stream_id)
        .bind(kind.as_str())
        .bind(timestamp)
        .bind(title)
        .bind(category_name)
        .bind(language)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        let row = sqlx::query_as::<_, StreamEventRow>("SELECT * FROM stream_events WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        StreamEvent::try_from(row)
    }

    async fn list_by_stream(&self, stream_id: i64) -> Result<Vec<StreamEvent>> {
        let rows = sqlx::query_as::<_, StreamEventRow>(
            "SELECT * FROM stream_events WHERE stream_id = ? ORDER BY timestamp, id",
        )
        .bind(stream_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(StreamEvent::try_from).collect()
    }
}
