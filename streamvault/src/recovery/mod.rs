//! Startup recovery: orphaned recordings, queue rehydration, and
//! live-flag reconciliation.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::database::repositories::{
    RecordingRepository, RecordingUpdate, StreamRepository, StreamerRepository,
};
use crate::domain::types::RecordingStatus;
use crate::jobs::JobQueue;
use crate::recorder::MIN_CAPTURE_BYTES;
use crate::supervisor::ProcessSupervisor;
use crate::twitch::TwitchApiClient;
use crate::Result;

/// Outcome of a recovery pass, for logs and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub recovered: usize,
    pub failed: usize,
    pub requeued_tasks: usize,
    pub reconciled_streamers: usize,
}

pub struct RecoveryCoordinator {
    streamers: Arc<dyn StreamerRepository>,
    streams: Arc<dyn StreamRepository>,
    recordings: Arc<dyn RecordingRepository>,
    queue: Arc<JobQueue>,
    supervisor: Arc<ProcessSupervisor>,
    twitch: Option<Arc<TwitchApiClient>>,
    orphan_check: Arc<Notify>,
}

impl RecoveryCoordinator {
    pub fn new(
        streamers: Arc<dyn StreamerRepository>,
        streams: Arc<dyn StreamRepository>,
        recordings: Arc<dyn RecordingRepository>,
        queue: Arc<JobQueue>,
        supervisor: Arc<ProcessSupervisor>,
        twitch: Option<Arc<TwitchApiClient>>,
        orphan_check: Arc<Notify>,
    ) -> Arc<Self> {
        Arc::new(Self {
            streamers,
            streams,
            recordings,
            queue,
            supervisor,
            twitch,
            orphan_check,
        })
    }

    /// Full startup pass. Runs before EventSub traffic is accepted.
    pub async fn run_startup_recovery(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        let (recovered, failed) = self.resolve_orphans().await?;
        report.recovered = recovered;
        report.failed = failed;

        let pending = self.queue.rehydrate().await?;
        report.requeued_tasks = pending.len();

        report.reconciled_streamers = self.reconcile_live_flags().await?;

        info!(
            recovered = report.recovered,
            failed = report.failed,
            requeued = report.requeued_tasks,
            reconciled = report.reconciled_streamers,
            "Startup recovery complete"
        );
        Ok(report)
    }

    /// Resolve recordings left in `recording` state.
    ///
    /// A usable capture file with no live supervisor handle becomes a
    /// completed recording with the pipeline enqueued; everything else
    /// is marked failed.
    pub async fn resolve_orphans(&self) -> Result<(usize, usize)> {
        let orphans = self.recordings.list_orphaned().await?;
        let mut recovered = 0usize;
        let mut failed = 0usize;

        for recording in orphans {
            let handle_id = format!("capture-{}", recording.id);
            if self.supervisor.is_running(&handle_id) {
                continue;
            }

            let ts_path = PathBuf::from(recording.ts_path());
            let size = tokio::fs::metadata(&ts_path).await.map(|m| m.len()).unwrap_or(0);
            let now = Utc::now();

            if size >= MIN_CAPTURE_BYTES {
                info!(
                    recording_id = recording.id,
                    size, "Recovering orphaned recording"
                );
                if let Err(e) = self.streams.end_stream(recording.stream_id, now).await {
                    warn!(stream_id = recording.stream_id, error = %e, "Failed to end orphaned stream");
                }
                self.recordings
                    .update(
                        recording.id,
                        RecordingUpdate {
                            status: Some(RecordingStatus::Completed),
                            end_time: Some(now),
                            ..RecordingUpdate::default()
                        },
                    )
                    .await?;
                let tasks = crate::pipeline::pipeline_tasks(recording.id, recording.stream_id);
                self.queue.enqueue(tasks).await?;
                recovered += 1;
            } else {
                warn!(
                    recording_id = recording.id,
                    size, "Orphaned recording unusable; marking failed"
                );
                if let Err(e) = self.streams.end_stream(recording.stream_id, now).await {
                    warn!(stream_id = recording.stream_id, error = %e, "Failed to end orphaned stream");
                }
                self.recordings
                    .update(
                        recording.id,
                        RecordingUpdate {
                            status: Some(RecordingStatus::Failed),
                            end_time: Some(now),
                            ..RecordingUpdate::default()
                        },
                    )
                    .await?;
                failed += 1;
            }
        }

        Ok((recovered, failed))
    }

    /// Correct `is_live` flags against the Twitch API.
    async fn reconcile_live_flags(&self) -> Result<usize> {
        let Some(twitch) = &self.twitch else {
            return Ok(0);
        };

        let live_flagged = self.streamers.list_live().await?;
        if live_flagged.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = live_flagged.iter().map(|s| s.twitch_id.clone()).collect();
        let actually_live = match twitch.get_streams_by_user_ids(&ids).await {
            Ok(streams) => streams,
            Err(e) => {
                warn!(error = %e, "Live-flag reconciliation probe failed");
                return Ok(0);
            }
        };

        let mut corrected = 0usize;
        for streamer in live_flagged {
            let still_live = actually_live.iter().any(|s| s.user_id == streamer.twitch_id);
            if !still_live {
                info!(streamer = %streamer.username, "Correcting stale live flag");
                self.streamers.set_live(streamer.id, false).await?;
                if let Some(stream) = self.streams.find_live_by_streamer(streamer.id).await? {
                    let _ = self.streams.end_stream(stream.id, Utc::now()).await;
                }
                corrected += 1;
            }
        }
        Ok(corrected)
    }

    /// React to cleanup completions by re-scanning for orphans.
    pub fn start_orphan_listener(self: &Arc<Self>, cancel_token: CancellationToken) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => break,
                    _ = coordinator.orphan_check.notified() => {
                        if let Err(e) = coordinator.resolve_orphans().await {
                            warn!(error = %e, "Orphan re-scan failed");
                        }
                    }
                }
            }
        });
    }
}
