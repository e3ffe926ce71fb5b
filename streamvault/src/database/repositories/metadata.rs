//! Stream metadata repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::StreamMetadataRow;
use crate::domain::StreamMetadata;
use crate::Result;

/// Artefact path fields that can be updated individually.
#[derive(Debug, Clone, Default)]
pub struct MetadataPaths {
    pub json_path: Option<String>,
    pub nfo_path: Option<String>,
    pub tvshow_nfo_path: Option<String>,
    pub chapters_vtt_path: Option<String>,
    pub chapters_srt_path: Option<String>,
    pub chapters_ffmpeg_path: Option<String>,
    pub chapters_xml_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub metadata_embedded: Option<bool>,
}

/// Stream metadata repository trait.
#[async_trait]
pub trait StreamMetadataRepository: Send + Sync {
    /// Merge the given paths into the stream's metadata row, creating it
    /// when absent. `None` fields keep their stored value.
    async fn upsert(&self, stream_id: i64, paths: MetadataPaths) -> Result<StreamMetadata>;
    async fn get_by_stream(&self, stream_id: i64) -> Result<Option<StreamMetadata>>;
}

/// SQLx implementation of StreamMetadataRepository.
pub struct SqlxStreamMetadataRepository {
    pool: SqlitePool,
}

impl SqlxStreamMetadataRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StreamMetadataRepository for SqlxStreamMetadataRepository {
    async fn upsert(&self, stream_id: i64, paths: MetadataPaths) -> Result<StreamMetadata> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO stream_metadata (stream_id) VALUES (?)")
            .bind(stream_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE stream_metadata SET \
             json_path = COALESCE(?, json_path), \
             nfo_path = COALESCE(?, nfo_path), \
             tvshow_nfo_path = COALESCE(?, tvshow_nfo_path), \
             chapters_vtt_path = COALESCE(?, chapters_vtt_path), \
             chapters_srt_path = COALESCE(?, chapters_srt_path), \
             chapters_ffmpeg_path = COALESCE(?, chapters_ffmpeg_path), \
             chapters_xml_path = COALESCE(?, chapters_xml_path), \
             thumbnail_path = COALESCE(?, thumbnail_path), \
             metadata_embedded = COALESCE(?, metadata_embedded) \
             WHERE stream_id = ?",
        )
        .bind(paths.json_path)
        .bind(paths.nfo_path)
        .bind(paths.tvshow_nfo_path)
        .bind(paths.chapters_vtt_path)
        .bind(paths.chapters_srt_path)
        .bind(paths.chapters_ffmpeg_path)
        .bind(paths.chapters_xml_path)
        .bind(paths.thumbnail_path)
        .bind(paths.metadata_embedded)
        .bind(stream_id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, StreamMetadataRow>(
            "SELECT * FROM stream_metadata WHERE stream_id = ?",
        )
        .bind(stream_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(StreamMetadata::from(row))
    }

    async fn get_by_stream(&self, stream_id: i64) -> Result<Option<StreamMetadata>> {
        let row = sqlx::query_as::<_, StreamMetadataRow>(
            "SELECT * FROM stream_metadata WHERE stream_id = ?",
        )
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(StreamMetadata::from))
    }
}
