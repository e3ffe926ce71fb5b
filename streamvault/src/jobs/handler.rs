//! Task handler trait and execution context.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::progress::ProgressReporter;
use super::types::{Task, TaskKind};
use crate::Result;

/// Context passed to a running task handler.
#[derive(Clone)]
pub struct TaskContext {
    pub task_id: String,
    pub progress: ProgressReporter,
    pub cancellation_token: CancellationToken,
}

impl TaskContext {
    pub fn noop(task_id: impl Into<String>) -> Self {
        let task_id = task_id.into();
        Self {
            progress: ProgressReporter::noop(task_id.clone()),
            task_id,
            cancellation_token: CancellationToken::new(),
        }
    }
}

/// Trait for background task handlers.
///
/// Handlers MUST be idempotent: re-execution after a crash has to yield
/// the same terminal artefact set. They must also observe the context's
/// cancellation token at their blocking points.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Task kinds this handler executes.
    fn kinds(&self) -> Vec<TaskKind>;

    /// Execute the task.
    async fn run(&self, task: &Task, ctx: &TaskContext) -> Result<()>;

    /// Handler name for logs.
    fn name(&self) -> &'static str;
}
