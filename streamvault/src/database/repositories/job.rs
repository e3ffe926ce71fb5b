//! Database-backed task persistence for the job queue.
//!
//! Every state transition goes through here so that crash recovery can
//! rebuild the in-flight graph.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::database::models::JobRow;
use crate::jobs::types::{Task, TaskState};
use crate::{Error, Result};

/// Counts of tasks per state, for `queue_stats_update` broadcasts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    pub queued: i64,
    pub running: i64,
    pub succeeded: i64,
    pub failed: i64,
    pub cancelled: i64,
    pub skipped: i64,
}

/// Job repository trait.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a group of tasks and their dependency edges atomically.
    async fn insert_tasks(&self, tasks: &[Task]) -> Result<()>;

    /// Atomically claim the highest-priority ready task: queued, past
    /// `not_before`, kind not excluded, and all dependencies succeeded.
    async fn claim_ready(
        &self,
        now: DateTime<Utc>,
        excluded_kinds: &[&str],
    ) -> Result<Option<Task>>;

    async fn get(&self, id: &str) -> Result<Task>;
    async fn mark_succeeded(&self, id: &str) -> Result<()>;
    /// Requeue with a backoff deadline, resetting the state to `queued`.
    async fn requeue(&self, id: &str, not_before: DateTime<Utc>, error: &str) -> Result<()>;
    async fn mark_failed(&self, id: &str, error: &str) -> Result<()>;
    async fn mark_cancelled(&self, id: &str) -> Result<()>;
    async fn set_progress(&self, id: &str, progress: f64) -> Result<()>;

    /// Transitively skip queued dependents of failed/cancelled/skipped
    /// tasks. Returns the ids that were skipped.
    async fn skip_blocked_dependents(&self) -> Result<Vec<String>>;

    /// All non-terminal tasks with their dependency lists, for recovery.
    async fn list_non_terminal(&self) -> Result<Vec<Task>>;

    /// Move every `running` task back to `queued` (handlers are
    /// idempotent; this runs before workers start).
    async fn requeue_interrupted(&self) -> Result<u64>;

    async fn list_by_recording(&self, recording_id: i64) -> Result<Vec<Task>>;
    async fn stats(&self) -> Result<QueueStats>;
}

/// SQLx implementation of JobRepository.
pub struct SqlxJobRepository {
    pool: SqlitePool,
}

impl SqlxJobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_deps(&self, task: &mut Task) -> Result<()> {
        let deps: Vec<String> =
            sqlx::query_scalar("SELECT depends_on FROM job_dependencies WHERE job_id = ?")
                .bind(&task.id)
                .fetch_all(&self.pool)
                .await?;
        task.depends_on = deps;
        Ok(())
    }
}

#[async_trait]
impl JobRepository for SqlxJobRepository {
    async fn insert_tasks(&self, tasks: &[Task]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for task in tasks {
            sqlx::query(
                "INSERT INTO jobs \
                 (id, kind, priority, payload, state, attempts, max_attempts, progress, \
                  recording_id, created_at, started_at, finished_at, not_before, last_error) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, NULL)",
            )
            .bind(&task.id)
            .bind(task.kind.as_str())
            .bind(task.priority as i64)
            .bind(serde_json::to_string(&task.payload)?)
            .bind(task.state.as_str())
            .bind(task.attempts as i64)
            .bind(task.max_attempts as i64)
            .bind(task.progress)
            .bind(task.recording_id)
            .bind(task.created_at)
            .bind(task.not_before)
            .execute(&mut *tx)
            .await?;

            for dep in &task.depends_on {
                sqlx::query("INSERT INTO job_dependencies (job_id, depends_on) VALUES (?, ?)")
                    .bind(&task.id)
                    .bind(dep)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn claim_ready(
        &self,
        now: DateTime<Utc>,
        excluded_kinds: &[&str],
    ) -> Result<Option<Task>> {
        let mut tx = self.pool.begin().await?;

        // Kind names are compile-time constants; the placeholder list is
        // built only for their count.
        let exclusion = if excluded_kinds.is_empty() {
            String::new()
        } else {
            let marks = vec!["?"; excluded_kinds.len()].join(", ");
            format!("AND j.kind NOT IN ({marks})")
        };
        let sql = format!(
            "SELECT j.* FROM jobs j \
             WHERE j.state = 'queued' \
               AND (j.not_before IS NULL OR j.not_before <= ?) \
               {exclusion} \
               AND NOT EXISTS (\
                   SELECT 1 FROM job_dependencies d \
                   JOIN jobs p ON p.id = d.depends_on \
                   WHERE d.job_id = j.id AND p.state != 'succeeded') \
             ORDER BY j.priority DESC, j.created_at ASC \
             LIMIT 1",
        );

        let mut query = sqlx::query_as::<_, JobRow>(&sql).bind(now);
        for kind in excluded_kinds {
            query = query.bind(*kind);
        }
        let row = query.fetch_optional(&mut *tx).await?;

        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query(
            "UPDATE jobs SET state = 'running', started_at = ?, attempts = attempts + 1 \
             WHERE id = ?",
        )
        .bind(now)
        .bind(&row.id)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(&row.id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        let mut task = Task::try_from(row)?;
        self.load_deps(&mut task).await?;
        Ok(Some(task))
    }

    async fn get(&self, id: &str) -> Result<Task> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Task", id))?;
        let mut task = Task::try_from(row)?;
        self.load_deps(&mut task).await?;
        Ok(task)
    }

    async fn mark_succeeded(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET state = 'succeeded', progress = 1.0, finished_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn requeue(&self, id: &str, not_before: DateTime<Utc>, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET state = 'queued', not_before = ?, last_error = ? WHERE id = ?",
        )
        .bind(not_before)
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET state = 'failed', finished_at = ?, last_error = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(error)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_cancelled(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE jobs SET state = 'cancelled', finished_at = ? \
             WHERE id = ? AND state IN ('queued', 'running')",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_progress(&self, id: &str, progress: f64) -> Result<()> {
        sqlx::query("UPDATE jobs SET progress = ? WHERE id = ?")
            .bind(progress.clamp(0.0, 1.0))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn skip_blocked_dependents(&self) -> Result<Vec<String>> {
        let mut skipped = Vec::new();

        // One pass per dependency level; the DAG is shallow.
        loop {
            let ids: Vec<String> = sqlx::query_scalar(
                "SELECT DISTINCT j.id FROM jobs j \
                 JOIN job_dependencies d ON d.job_id = j.id \
                 JOIN jobs p ON p.id = d.depends_on \
                 WHERE j.state = 'queued' \
                   AND p.state IN ('failed', 'cancelled', 'skipped')",
            )
            .fetch_all(&self.pool)
            .await?;

            if ids.is_empty() {
                break;
            }

            for id in &ids {
                sqlx::query(
                    "UPDATE jobs SET state = 'skipped', finished_at = ?, \
                     last_error = 'dependency failed' WHERE id = ? AND state = 'queued'",
                )
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await?;
            }
            skipped.extend(ids);
        }

        Ok(skipped)
    }

    async fn list_non_terminal(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE state IN ('queued', 'running') \
             ORDER BY priority DESC, created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let mut task = Task::try_from(row)?;
            self.load_deps(&mut task).await?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    async fn requeue_interrupted(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE jobs SET state = 'queued', started_at = NULL WHERE state = 'running'",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list_by_recording(&self, recording_id: i64) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, JobRow>(
            "SELECT * FROM jobs WHERE recording_id = ? ORDER BY created_at",
        )
        .bind(recording_id)
        .fetch_all(&self.pool)
        .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            let mut task = Task::try_from(row)?;
            self.load_deps(&mut task).await?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    async fn stats(&self) -> Result<QueueStats> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = QueueStats::default();
        for (state, count) in rows {
            match TaskState::parse(&state) {
                Some(TaskState::Queued) => stats.queued = count,
                Some(TaskState::Running) => stats.running = count,
                Some(TaskState::Succeeded) => stats.succeeded = count,
                Some(TaskState::Failed) => stats.failed = count,
                Some(TaskState::Cancelled) => stats.cancelled = count,
                Some(TaskState::Skipped) => stats.skipped = count,
                None => {}
            }
        }
        Ok(stats)
    }
}
