//! Logging setup: reloadable filter, rolling app log, retention
//! cleanup, and the recording activity log.

pub mod activity;

pub use activity::ActivityLog;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    reload::{self, Handle},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "streamvault=info,sqlx=warn,tower_http=warn";

/// Retention for per-streamer capture/convert logs.
const STREAMER_LOG_RETENTION_DAYS: i64 = 14;

/// Retention for system logs.
const SYSTEM_LOG_RETENTION_DAYS: i64 = 30;

/// Timer formatting timestamps in the server's local timezone.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Type alias for the reload handle.
pub type FilterHandle = Handle<EnvFilter, tracing_subscriber::Registry>;

/// Logging configuration with a reloadable filter.
pub struct LoggingConfig {
    handle: FilterHandle,
    log_dir: PathBuf,
}

impl LoggingConfig {
    pub fn get_filter(&self) -> String {
        self.handle
            .with_current(|filter| filter.to_string())
            .unwrap_or_default()
    }

    /// Set a new filter directive (e.g. "streamvault=debug,sqlx=warn").
    pub fn set_filter(&self, directive: &str) -> crate::Result<()> {
        let new_filter = EnvFilter::try_new(directive)
            .map_err(|e| crate::Error::config(format!("invalid filter directive: {e}")))?;
        self.handle
            .reload(new_filter)
            .map_err(|e| crate::Error::Other(format!("failed to reload filter: {e}")))?;
        info!(directive = %directive, "Log filter updated");
        Ok(())
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Daily cleanup of old log files: 14 days for per-streamer
    /// capture/convert logs, 30 days for system logs.
    pub fn start_retention_cleanup(self: &Arc<Self>, cancel_token: CancellationToken) {
        let log_dir = self.log_dir.clone();

        tokio::spawn(async move {
            let cleanup_interval = Duration::from_secs(24 * 60 * 60);

            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Log retention cleanup task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(cleanup_interval) => {
                        for (subdir, days) in [
                            ("streamlink", STREAMER_LOG_RETENTION_DAYS),
                            ("ffmpeg", STREAMER_LOG_RETENTION_DAYS),
                            ("app", SYSTEM_LOG_RETENTION_DAYS),
                        ] {
                            if let Err(e) = cleanup_old_logs(&log_dir.join(subdir), days).await {
                                warn!(subdir, error = %e, "Failed to clean up old logs");
                            }
                        }
                    }
                }
            }
        });
    }
}

/// Delete files older than `retention_days` by modification time.
async fn cleanup_old_logs(dir: &Path, retention_days: i64) -> std::io::Result<()> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let mut deleted = 0usize;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let modified = entry.metadata().await?.modified()?;
        let modified: chrono::DateTime<Utc> = modified.into();
        if modified < cutoff {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to delete old log file");
            } else {
                deleted += 1;
            }
        }
    }

    if deleted > 0 {
        info!(dir = %dir.display(), count = deleted, "Cleaned up old log files");
    }
    Ok(())
}

/// Initialize logging. Keep the returned guard alive for the process
/// lifetime.
pub fn init_logging(log_dir: &str) -> crate::Result<(Arc<LoggingConfig>, WorkerGuard)> {
    let log_path = PathBuf::from(log_dir);
    std::fs::create_dir_all(log_path.join("app"))?;

    let file_appender = tracing_appender::rolling::daily(log_path.join("app"), "streamvault.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let initial_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let (filter_layer, filter_handle) = reload::Layer::new(initial_filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| crate::Error::Other(format!("failed to set global subscriber: {e}")))?;

    let config = Arc::new(LoggingConfig {
        handle: filter_handle,
        log_dir: log_path,
    });

    Ok((config, guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter() {
        assert!(DEFAULT_LOG_FILTER.contains("streamvault=info"));
        assert!(DEFAULT_LOG_FILTER.contains("sqlx=warn"));
    }

    #[tokio::test]
    async fn test_cleanup_missing_dir_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        cleanup_old_logs(&dir.path().join("nope"), 14).await.unwrap();
    }
}
