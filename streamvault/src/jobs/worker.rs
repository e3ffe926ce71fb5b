//! Worker pool draining the job queue.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::handler::{TaskContext, TaskHandler};
use super::progress::ProgressReporter;
use super::queue::JobQueue;
use super::types::TaskKind;
use crate::Error;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks.
    pub workers: usize,
    /// Fallback poll interval when no wakeup arrives.
    pub poll_interval_ms: u64,
    /// Hard per-task timeout in seconds.
    pub task_timeout_secs: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval_ms: 500,
            task_timeout_secs: 3600,
        }
    }
}

/// A pool of workers executing queue tasks through registered handlers.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    cancellation_token: CancellationToken,
    tasks: parking_lot::Mutex<Option<JoinSet<()>>>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self {
            config,
            cancellation_token: CancellationToken::new(),
            tasks: parking_lot::Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Start the pool. Handlers are indexed by task kind; a task with no
    /// handler fails terminally rather than blocking the queue.
    pub fn start(&self, queue: Arc<JobQueue>, handlers: Vec<Arc<dyn TaskHandler>>) {
        let mut by_kind: HashMap<TaskKind, Arc<dyn TaskHandler>> = HashMap::new();
        for handler in handlers {
            for kind in handler.kinds() {
                by_kind.insert(kind, handler.clone());
            }
        }
        let by_kind = Arc::new(by_kind);

        info!(workers = self.config.workers, "Starting job worker pool");

        let poll_interval = std::time::Duration::from_millis(self.config.poll_interval_ms.max(1));
        let task_timeout = std::time::Duration::from_secs(self.config.task_timeout_secs);

        let mut tasks = self.tasks.lock();
        if let Some(ref mut join_set) = *tasks {
            for i in 0..self.config.workers {
                let queue = queue.clone();
                let by_kind = by_kind.clone();
                let cancellation_token = self.cancellation_token.clone();
                let notifier = queue.notifier();

                join_set.spawn(async move {
                    debug!(worker = i, "Job worker started");

                    loop {
                        tokio::select! {
                            _ = cancellation_token.cancelled() => {
                                debug!(worker = i, "Job worker shutting down");
                                break;
                            }
                            _ = notifier.notified() => {}
                            _ = tokio::time::sleep(poll_interval) => {}
                        }

                        loop {
                            let task = match queue.claim_next().await {
                                Ok(Some(task)) => task,
                                Ok(None) => break,
                                Err(e) => {
                                    error!(worker = i, error = %e, "Failed to claim task");
                                    break;
                                }
                            };

                            let Some(handler) = by_kind.get(&task.kind) else {
                                warn!(task_id = %task.id, kind = %task.kind, "No handler for task kind");
                                let _ = queue
                                    .complete(&task, Err(Error::Validation(format!(
                                        "no handler registered for kind {}",
                                        task.kind
                                    ))))
                                    .await;
                                continue;
                            };

                            let token = queue.token_for(&task.id);
                            let ctx = TaskContext {
                                task_id: task.id.clone(),
                                progress: ProgressReporter::new(
                                    task.id.clone(),
                                    task.kind,
                                    task.recording_id,
                                    queue.progress_sender(),
                                ),
                                cancellation_token: token.clone(),
                            };

                            debug!(
                                worker = i, task_id = %task.id, kind = %task.kind,
                                attempt = task.attempts, "Executing task"
                            );

                            let outcome = tokio::select! {
                                result = tokio::time::timeout(task_timeout, handler.run(&task, &ctx)) => {
                                    match result {
                                        Ok(result) => result,
                                        Err(_) => Err(Error::Pipeline(format!(
                                            "task {} timed out after {}s",
                                            task.id, task_timeout.as_secs()
                                        ))),
                                    }
                                }
                                _ = token.cancelled() => Err(Error::Cancelled),
                                _ = cancellation_token.cancelled() => Err(Error::Cancelled),
                            };

                            if let Err(e) = queue.complete(&task, outcome).await {
                                error!(task_id = %task.id, error = %e, "Failed to record task outcome");
                            }

                            if cancellation_token.is_cancelled() {
                                break;
                            }
                        }
                    }
                });
            }
        }
    }

    /// Stop accepting work and wait for in-flight tasks to settle.
    pub async fn shutdown(&self, deadline: std::time::Duration) {
        self.cancellation_token.cancel();
        let join_set = self.tasks.lock().take();
        if let Some(mut join_set) = join_set {
            let drain = async {
                while join_set.join_next().await.is_some() {}
            };
            if tokio::time::timeout(deadline, drain).await.is_err() {
                warn!("Worker pool did not drain before deadline; aborting workers");
            }
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
