//! Durable, priority-ordered background job queue.

pub mod handler;
pub mod progress;
pub mod queue;
pub mod types;
pub mod worker;

pub use handler::{TaskContext, TaskHandler};
pub use progress::{ProgressReporter, ProgressUpdate};
pub use queue::{JobQueue, QueueEvent};
pub use types::{Task, TaskKind, TaskState};
pub use worker::{WorkerPool, WorkerPoolConfig};
