//! Throttled task progress reporting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::types::TaskKind;

/// A single progress sample from a running task.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub task_id: String,
    pub kind: TaskKind,
    pub recording_id: Option<i64>,
    pub fraction: f64,
    pub message: Option<String>,
}

/// Handle given to task handlers for reporting progress.
///
/// Samples are throttled to at most one per 200 ms per task; the final
/// `1.0` sample always passes so the UI never sticks short of done.
#[derive(Clone)]
pub struct ProgressReporter {
    task_id: String,
    kind: TaskKind,
    recording_id: Option<i64>,
    tx: Option<mpsc::Sender<ProgressUpdate>>,
    min_interval: Duration,
    last_sent: Arc<parking_lot::Mutex<Option<Instant>>>,
}

impl ProgressReporter {
    pub const THROTTLE: Duration = Duration::from_millis(200);

    pub fn new(
        task_id: impl Into<String>,
        kind: TaskKind,
        recording_id: Option<i64>,
        tx: mpsc::Sender<ProgressUpdate>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            recording_id,
            tx: Some(tx),
            min_interval: Self::THROTTLE,
            last_sent: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    /// A reporter that drops everything, for tests and ad-hoc runs.
    pub fn noop(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            kind: TaskKind::Cleanup,
            recording_id: None,
            tx: None,
            min_interval: Self::THROTTLE,
            last_sent: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    /// Report progress in `[0.0, 1.0]` with an optional message.
    pub fn report(&self, fraction: f64, message: Option<&str>) {
        let Some(tx) = &self.tx else {
            return;
        };

        let fraction = fraction.clamp(0.0, 1.0);
        let terminal = fraction >= 1.0;
        {
            let mut last = self.last_sent.lock();
            if !terminal
                && let Some(at) = *last
                && at.elapsed() < self.min_interval
            {
                return;
            }
            *last = Some(Instant::now());
        }

        let _ = tx.try_send(ProgressUpdate {
            task_id: self.task_id.clone(),
            kind: self.kind,
            recording_id: self.recording_id,
            fraction,
            message: message.map(|m| m.to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_throttles_intermediate_samples() {
        let (tx, mut rx) = mpsc::channel(16);
        let reporter = ProgressReporter::new("t1", TaskKind::Mp4Remux, Some(3), tx);

        reporter.report(0.1, None);
        reporter.report(0.2, None);
        reporter.report(0.3, None);

        let first = rx.try_recv().expect("first sample should pass");
        assert_eq!(first.fraction, 0.1);
        assert!(rx.try_recv().is_err(), "subsequent samples are throttled");
    }

    #[tokio::test]
    async fn test_terminal_sample_bypasses_throttle() {
        let (tx, mut rx) = mpsc::channel(16);
        let reporter = ProgressReporter::new("t1", TaskKind::Thumbnail, None, tx);

        reporter.report(0.5, None);
        reporter.report(1.0, Some("done"));

        assert_eq!(rx.try_recv().unwrap().fraction, 0.5);
        let last = rx.try_recv().unwrap();
        assert_eq!(last.fraction, 1.0);
        assert_eq!(last.message.as_deref(), Some("done"));
    }

    #[test]
    fn test_noop_never_panics() {
        ProgressReporter::noop("t").report(0.5, Some("ignored"));
    }
}
