//! Processing state repository.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::database::models::ProcessingStateRow;
use crate::domain::types::{ProcessingStep, StepStatus};
use crate::domain::ProcessingState;
use crate::{Error, Result};

/// Processing state repository trait.
#[async_trait]
pub trait ProcessingRepository: Send + Sync {
    /// Create the all-pending state row for a recording if missing.
    async fn init(&self, recording_id: i64) -> Result<ProcessingState>;

    /// Transition one step, enforcing the predecessor gate for `running`.
    async fn set_step(
        &self,
        recording_id: i64,
        step: ProcessingStep,
        status: StepStatus,
        last_error: Option<&str>,
    ) -> Result<ProcessingState>;

    async fn get(&self, recording_id: i64) -> Result<ProcessingState>;
}

/// SQLx implementation of ProcessingRepository.
pub struct SqlxProcessingRepository {
    pool: SqlitePool,
}

impl SqlxProcessingRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessingRepository for SqlxProcessingRepository {
    async fn init(&self, recording_id: i64) -> Result<ProcessingState> {
        sqlx::query(
            "INSERT OR IGNORE INTO processing_states (recording_id, updated_at) VALUES (?, ?)",
        )
        .bind(recording_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        self.get(recording_id).await
    }

    async fn set_step(
        &self,
        recording_id: i64,
        step: ProcessingStep,
        status: StepStatus,
        last_error: Option<&str>,
    ) -> Result<ProcessingState> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ProcessingStateRow>(
            "SELECT * FROM processing_states WHERE recording_id = ?",
        )
        .bind(recording_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::not_found("ProcessingState", recording_id.to_string()))?;
        let state = ProcessingState::try_from(row)?;

        if status == StepStatus::Running && !state.can_start(step) {
            return Err(Error::InvalidStateTransition {
                from: format!("{step}={}", state.step(step)),
                to: "running (predecessors incomplete)".to_string(),
            });
        }

        // Column names come from ProcessingStep::as_str, a closed set.
        let query = format!(
            "UPDATE processing_states SET {} = ?, last_error = COALESCE(?, last_error), \
             updated_at = ? WHERE recording_id = ?",
            step.as_str()
        );
        sqlx::query(&query)
            .bind(status.as_str())
            .bind(last_error)
            .bind(Utc::now())
            .bind(recording_id)
            .execute(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, ProcessingStateRow>(
            "SELECT * FROM processing_states WHERE recording_id = ?",
        )
        .bind(recording_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        ProcessingState::try_from(row)
    }

    async fn get(&self, recording_id: i64) -> Result<ProcessingState> {
        let row = sqlx::query_as::<_, ProcessingStateRow>(
            "SELECT * FROM processing_states WHERE recording_id = ?",
        )
        .bind(recording_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("ProcessingState", recording_id.to_string()))?;
        ProcessingState::try_from(row)
    }
}
