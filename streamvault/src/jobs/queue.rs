//! Database-backed job queue implementation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::progress::ProgressUpdate;
use super::types::{Task, TaskKind, TaskState};
use crate::database::repositories::{JobRepository, QueueStats};
use crate::domain::value_objects::RetryPolicy;
use crate::{Error, Result};

/// Events emitted as tasks move through the queue.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    TaskStarted {
        task_id: String,
        kind: TaskKind,
        recording_id: Option<i64>,
    },
    TaskProgress {
        task_id: String,
        kind: TaskKind,
        recording_id: Option<i64>,
        fraction: f64,
        message: Option<String>,
    },
    TaskFinished {
        task_id: String,
        kind: TaskKind,
        recording_id: Option<i64>,
        state: TaskState,
        last_error: Option<String>,
    },
    StatsChanged(QueueStats),
}

const EVENT_CAPACITY: usize = 256;
const PROGRESS_CHANNEL_CAPACITY: usize = 512;

/// Durable priority queue with dependency edges and per-kind caps.
///
/// The database is the source of truth; this type adds wakeups,
/// cancellation tokens for running tasks, and per-kind concurrency
/// accounting. The ready set is consulted under the repository's
/// claim transaction; handlers never run while it is held.
pub struct JobQueue {
    repo: Arc<dyn JobRepository>,
    retry_policy: RetryPolicy,
    notify: Arc<Notify>,
    events: broadcast::Sender<QueueEvent>,
    /// Cancellation tokens of running tasks, keyed by task id.
    running: DashMap<String, CancellationToken>,
    /// Running count per kind, for concurrency caps.
    kind_counts: parking_lot::Mutex<HashMap<TaskKind, usize>>,
    progress_tx: mpsc::Sender<ProgressUpdate>,
}

impl JobQueue {
    pub fn new(repo: Arc<dyn JobRepository>) -> Arc<Self> {
        Self::with_retry_policy(repo, RetryPolicy::pipeline())
    }

    pub fn with_retry_policy(repo: Arc<dyn JobRepository>, retry_policy: RetryPolicy) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_CAPACITY);

        let queue = Arc::new(Self {
            repo,
            retry_policy,
            notify: Arc::new(Notify::new()),
            events,
            running: DashMap::new(),
            kind_counts: parking_lot::Mutex::new(HashMap::new()),
            progress_tx,
        });

        queue.clone().spawn_progress_pump(progress_rx);
        queue
    }

    /// Sender handed to `ProgressReporter`s.
    pub fn progress_sender(&self) -> mpsc::Sender<ProgressUpdate> {
        self.progress_tx.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub fn notifier(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Enqueue a group of tasks (and their edges) atomically.
    pub async fn enqueue(&self, tasks: Vec<Task>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        let ids: Vec<_> = tasks.iter().map(|t| t.id.clone()).collect();
        self.repo.insert_tasks(&tasks).await?;
        debug!(count = tasks.len(), ?ids, "Enqueued tasks");
        self.notify.notify_waiters();
        self.emit_stats().await;
        Ok(())
    }

    /// Cancel a task; a running handler observes it via its token and
    /// queued dependents become skipped.
    pub async fn cancel(&self, task_id: &str) -> Result<()> {
        self.repo.mark_cancelled(task_id).await?;
        if let Some(entry) = self.running.get(task_id) {
            entry.value().cancel();
        }
        let skipped = self.repo.skip_blocked_dependents().await?;
        if !skipped.is_empty() {
            info!(task_id, count = skipped.len(), "Skipped dependents of cancelled task");
        }
        for id in &skipped {
            if let Ok(dep) = self.repo.get(id).await {
                self.emit_finished(&dep).await;
            }
        }
        let task = self.repo.get(task_id).await?;
        self.emit_finished(&task).await;
        self.emit_stats().await;
        Ok(())
    }

    /// Claim the next ready task, respecting per-kind concurrency caps.
    pub async fn claim_next(&self) -> Result<Option<Task>> {
        let excluded: Vec<&'static str> = {
            let counts = self.kind_counts.lock();
            counts
                .iter()
                .filter(|(kind, count)| **count >= kind.concurrency_cap())
                .map(|(kind, _)| kind.as_str())
                .collect()
        };

        let task = self.repo.claim_ready(Utc::now(), &excluded).await?;
        if let Some(task) = &task {
            let token = CancellationToken::new();
            self.running.insert(task.id.clone(), token);
            *self.kind_counts.lock().entry(task.kind).or_insert(0) += 1;

            let _ = self.events.send(QueueEvent::TaskStarted {
                task_id: task.id.clone(),
                kind: task.kind,
                recording_id: task.recording_id,
            });
        }
        Ok(task)
    }

    /// Cancellation token of a claimed task.
    pub fn token_for(&self, task_id: &str) -> CancellationToken {
        self.running
            .get(task_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Record the outcome of a claimed task, applying the retry policy.
    pub async fn complete(&self, task: &Task, outcome: Result<()>) -> Result<()> {
        self.release(task);

        match outcome {
            Ok(()) => {
                self.repo.mark_succeeded(&task.id).await?;
                debug!(task_id = %task.id, kind = %task.kind, "Task succeeded");
            }
            Err(Error::Cancelled) => {
                self.repo.mark_cancelled(&task.id).await?;
                self.repo.skip_blocked_dependents().await?;
                info!(task_id = %task.id, kind = %task.kind, "Task cancelled");
            }
            Err(e) => {
                let retry_allowed = e.is_retryable() && task.attempts < task.max_attempts;
                if retry_allowed {
                    // attempts is 1-based after claim; backoff grows with it.
                    let delay = self.retry_policy.delay_for_attempt(task.attempts.saturating_sub(1));
                    let not_before = Utc::now()
                        + chrono::Duration::from_std(delay)
                            .unwrap_or_else(|_| chrono::Duration::seconds(30));
                    warn!(
                        task_id = %task.id, kind = %task.kind, attempts = task.attempts,
                        delay_secs = delay.as_secs(), error = %e,
                        "Task failed, requeueing with backoff"
                    );
                    self.repo.requeue(&task.id, not_before, &e.to_string()).await?;
                } else {
                    warn!(task_id = %task.id, kind = %task.kind, error = %e, "Task failed terminally");
                    self.repo.mark_failed(&task.id, &e.to_string()).await?;
                    let skipped = self.repo.skip_blocked_dependents().await?;
                    for id in &skipped {
                        if let Ok(dep) = self.repo.get(id).await {
                            self.emit_finished(&dep).await;
                        }
                    }
                }
            }
        }

        let task = self.repo.get(&task.id).await?;
        if task.state.is_terminal() {
            self.emit_finished(&task).await;
        }
        self.notify.notify_waiters();
        self.emit_stats().await;
        Ok(())
    }

    /// Rehydrate after a restart: requeue interrupted tasks and resolve
    /// dependents of tasks that terminally failed before the crash.
    pub async fn rehydrate(&self) -> Result<Vec<Task>> {
        let requeued = self.repo.requeue_interrupted().await?;
        if requeued > 0 {
            info!(count = requeued, "Requeued interrupted tasks");
        }
        self.repo.skip_blocked_dependents().await?;
        let pending = self.repo.list_non_terminal().await?;
        self.notify.notify_waiters();
        Ok(pending)
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        self.repo.stats().await
    }

    pub async fn tasks_for_recording(&self, recording_id: i64) -> Result<Vec<Task>> {
        self.repo.list_by_recording(recording_id).await
    }

    fn release(&self, task: &Task) {
        self.running.remove(&task.id);
        let mut counts = self.kind_counts.lock();
        if let Some(count) = counts.get_mut(&task.kind) {
            *count = count.saturating_sub(1);
        }
    }

    async fn emit_finished(&self, task: &Task) {
        let _ = self.events.send(QueueEvent::TaskFinished {
            task_id: task.id.clone(),
            kind: task.kind,
            recording_id: task.recording_id,
            state: task.state,
            last_error: task.last_error.clone(),
        });
    }

    async fn emit_stats(&self) {
        if let Ok(stats) = self.repo.stats().await {
            let _ = self.events.send(QueueEvent::StatsChanged(stats));
        }
    }

    fn spawn_progress_pump(self: Arc<Self>, mut rx: mpsc::Receiver<ProgressUpdate>) {
        tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                if let Err(e) = self.repo.set_progress(&update.task_id, update.fraction).await {
                    debug!(task_id = %update.task_id, error = %e, "Failed to persist progress");
                }
                let _ = self.events.send(QueueEvent::TaskProgress {
                    task_id: update.task_id,
                    kind: update.kind,
                    recording_id: update.recording_id,
                    fraction: update.fraction,
                    message: update.message,
                });
            }
        });
    }
}
