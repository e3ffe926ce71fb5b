//! Recording activity log.
//!
//! One structured line per lifecycle or pipeline transition, appended
//! to `app/recording_activity.log` alongside the tracing output. The
//! file gives operators a single chronological view of what happened
//! to each recording.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::warn;

const CHANNEL_CAPACITY: usize = 256;

/// Append-only activity log with a dedicated writer task.
pub struct ActivityLog {
    tx: mpsc::Sender<String>,
}

impl ActivityLog {
    pub fn new(log_dir: &Path) -> Self {
        let path: PathBuf = log_dir.join("app").join("recording_activity.log");
        let (tx, mut rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            if let Some(parent) = path.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await;
            let mut file = match file {
                Ok(file) => file,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot open activity log");
                    return;
                }
            };

            while let Some(line) = rx.recv().await {
                if file.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                let _ = file.write_all(b"\n").await;
                let _ = file.flush().await;
            }
        });

        Self { tx }
    }

    /// A no-op log for tests.
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self { tx }
    }

    /// Record an activity line. Never blocks; lines are dropped when
    /// the writer is saturated.
    pub fn record(&self, streamer: &str, recording_id: Option<i64>, event: &str, detail: &str) {
        let line = format!(
            "{} streamer={streamer} recording={} event={event} {detail}",
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            recording_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
        );
        let _ = self.tx.try_send(line);
    }
}
