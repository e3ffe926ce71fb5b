//! MP4 validation: size ratio, stream layout, and duration checks.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{PipelineContext, PipelinePayload};
use crate::config::ConfigResolver;
use crate::database::repositories::RecordingRepository;
use crate::domain::types::{ProcessingStep, RecordingStatus, StepStatus};
use crate::jobs::{Task, TaskContext, TaskHandler, TaskKind};
use crate::{Error, Result};

/// Minimum plausible MP4 size.
const MIN_MP4_BYTES: u64 = 1024 * 1024;

/// Minimum plausible duration in seconds.
const MIN_DURATION_SECS: f64 = 10.0;

/// Duration ratio below which validation always hard-fails.
const DURATION_RATIO_FLOOR: f64 = 0.30;

/// Size and duration thresholds for one capture regime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationThresholds {
    pub min_size_ratio: f64,
    pub max_size_ratio: f64,
    pub min_duration_ratio: f64,
}

impl ValidationThresholds {
    /// Proxied captures lose little to ad insertion.
    pub fn proxied() -> Self {
        Self {
            min_size_ratio: 0.70,
            max_size_ratio: 1.10,
            min_duration_ratio: 0.90,
        }
    }

    /// Without a proxy, ad-induced discontinuities shrink the MP4.
    pub fn direct() -> Self {
        Self {
            min_size_ratio: 0.50,
            max_size_ratio: 1.10,
            min_duration_ratio: 0.60,
        }
    }
}

/// Pure validation decision over the measured values.
///
/// `ts_duration` may be absent when the capture cannot be probed; the
/// duration-ratio checks are then skipped.
pub fn validate_measurements(
    mp4_size: u64,
    ts_size: u64,
    mp4_duration: Option<f64>,
    ts_duration: Option<f64>,
    video_streams: usize,
    thresholds: &ValidationThresholds,
) -> std::result::Result<(), String> {
    if mp4_size < MIN_MP4_BYTES {
        return Err(format!("MP4 too small: {mp4_size} bytes"));
    }

    if ts_size > 0 {
        let ratio = mp4_size as f64 / ts_size as f64;
        if ratio < thresholds.min_size_ratio {
            return Err(format!(
                "MP4/TS size ratio {ratio:.2} below minimum {:.2}",
                thresholds.min_size_ratio
            ));
        }
        if ratio > thresholds.max_size_ratio {
            return Err(format!(
                "MP4/TS size ratio {ratio:.2} above maximum {:.2}",
                thresholds.max_size_ratio
            ));
        }
    }

    if video_streams == 0 {
        return Err("no video stream in MP4".to_string());
    }

    let Some(mp4_duration) = mp4_duration else {
        return Err("MP4 reports no duration".to_string());
    };
    if mp4_duration < MIN_DURATION_SECS {
        return Err(format!("duration {mp4_duration:.1}s below {MIN_DURATION_SECS}s"));
    }

    if let Some(ts_duration) = ts_duration
        && ts_duration > 0.0
    {
        let ratio = mp4_duration / ts_duration;
        if ratio < DURATION_RATIO_FLOOR {
            return Err(format!(
                "MP4/TS duration ratio {ratio:.2} below hard floor {DURATION_RATIO_FLOOR:.2}"
            ));
        }
        if ratio < thresholds.min_duration_ratio {
            return Err(format!(
                "MP4/TS duration ratio {ratio:.2} below minimum {:.2}",
                thresholds.min_duration_ratio
            ));
        }
    }

    Ok(())
}

pub struct ValidationHandler {
    ctx: Arc<PipelineContext>,
}

impl ValidationHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    async fn validate(&self, payload: &PipelinePayload) -> Result<()> {
        let ctx = &self.ctx;
        let (recording, stream, streamer) = ctx.load(payload).await?;

        // The regime is pinned on the recording at spawn time; proxy
        // settings may have changed since the capture ran. The strict
        // flag stays live, it is operator policy rather than a capture
        // fact.
        let config = ctx.config.resolve(streamer.id).await?;
        let thresholds = if recording.used_proxy || config.strict_no_proxy_validation {
            ValidationThresholds::proxied()
        } else {
            ValidationThresholds::direct()
        };

        let ts_path = PathBuf::from(recording.ts_path());
        let mp4_path = PathBuf::from(recording.mp4_path());

        let mp4_size = tokio::fs::metadata(&mp4_path).await.map(|m| m.len()).unwrap_or(0);
        if mp4_size == 0 {
            return Err(Error::ValidationFailed(format!(
                "MP4 missing: {}",
                mp4_path.display()
            )));
        }
        let ts_size = tokio::fs::metadata(&ts_path).await.map(|m| m.len()).unwrap_or(0);

        let mp4_probe = super::ffmpeg::probe(&mp4_path).await?;
        let ts_probe = super::ffmpeg::probe(&ts_path).await.ok();

        validate_measurements(
            mp4_size,
            ts_size,
            mp4_probe.duration_secs,
            ts_probe.and_then(|p| p.duration_secs),
            mp4_probe.video_streams,
            &thresholds,
        )
        .map_err(Error::ValidationFailed)?;

        // Validation fixes the duration the sidecars will report.
        if let Some(duration) = mp4_probe.duration_secs {
            let _ = ctx
                .recordings
                .update(
                    payload.recording_id,
                    crate::database::repositories::RecordingUpdate {
                        duration_secs: Some(duration),
                        ..Default::default()
                    },
                )
                .await;
        }

        info!(
            recording_id = payload.recording_id,
            stream_id = stream.id,
            mp4_size, ts_size, "MP4 validation passed"
        );
        Ok(())
    }
}

#[async_trait]
impl TaskHandler for ValidationHandler {
    fn kinds(&self) -> Vec<TaskKind> {
        vec![TaskKind::Mp4Validation]
    }

    fn name(&self) -> &'static str {
        "mp4_validation"
    }

    async fn run(&self, task: &Task, _tctx: &TaskContext) -> Result<()> {
        let payload = PipelinePayload::from_task(task)?;
        let ctx = &self.ctx;

        ctx.set_step(
            payload.recording_id,
            ProcessingStep::Mp4Validation,
            StepStatus::Running,
            None,
        )
        .await?;

        match self.validate(&payload).await {
            Ok(()) => {
                ctx.set_step(
                    payload.recording_id,
                    ProcessingStep::Mp4Validation,
                    StepStatus::Completed,
                    None,
                )
                .await?;
                Ok(())
            }
            Err(e) => {
                warn!(recording_id = payload.recording_id, error = %e, "MP4 validation failed");
                ctx.set_step(
                    payload.recording_id,
                    ProcessingStep::Mp4Validation,
                    StepStatus::Failed,
                    Some(&e.to_string()),
                )
                .await?;
                // A failed validation condemns the whole recording; the
                // intermediate stays on disk for manual salvage.
                let _ = ctx
                    .recordings
                    .update(
                        payload.recording_id,
                        crate::database::repositories::RecordingUpdate {
                            status: Some(RecordingStatus::Failed),
                            ..Default::default()
                        },
                    )
                    .await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * MIB;

    #[test]
    fn test_size_ratio_boundaries_proxied() {
        let t = ValidationThresholds::proxied();
        // Exactly 0.70 passes, 0.69 fails.
        assert!(validate_measurements(700 * MIB, 1000 * MIB, Some(100.0), Some(100.0), 1, &t).is_ok());
        assert!(validate_measurements(690 * MIB, 1000 * MIB, Some(100.0), Some(100.0), 1, &t).is_err());
        // 1.10 passes, 1.11 fails.
        assert!(validate_measurements(1100 * MIB, 1000 * MIB, Some(100.0), Some(100.0), 1, &t).is_ok());
        assert!(validate_measurements(1110 * MIB, 1000 * MIB, Some(100.0), Some(100.0), 1, &t).is_err());
    }

    #[test]
    fn test_size_ratio_direct_regime() {
        let t = ValidationThresholds::direct();
        assert!(validate_measurements(500 * MIB, 1000 * MIB, Some(100.0), Some(100.0), 1, &t).is_ok());
        // Scenario: 3 GiB TS producing a 1.1 GiB MP4 (ratio 0.37).
        assert!(
            validate_measurements(1126 * MIB, 3 * GIB, Some(100.0), Some(100.0), 1, &t).is_err()
        );
    }

    #[test]
    fn test_video_stream_required() {
        let t = ValidationThresholds::direct();
        let err =
            validate_measurements(GIB, GIB, Some(100.0), Some(100.0), 0, &t).unwrap_err();
        assert!(err.contains("video stream"));
    }

    #[test]
    fn test_duration_floor_is_hard_in_both_regimes() {
        for t in [ValidationThresholds::proxied(), ValidationThresholds::direct()] {
            let err = validate_measurements(GIB, GIB, Some(29.0), Some(100.0), 1, &t).unwrap_err();
            assert!(err.contains("hard floor"), "{err}");
        }
    }

    #[test]
    fn test_duration_ratio_regimes() {
        // 0.8 passes direct (≥0.6) but fails proxied (≥0.9).
        assert!(validate_measurements(
            GIB, GIB, Some(80.0), Some(100.0), 1, &ValidationThresholds::direct()
        )
        .is_ok());
        assert!(validate_measurements(
            GIB, GIB, Some(80.0), Some(100.0), 1, &ValidationThresholds::proxied()
        )
        .is_err());
    }

    #[test]
    fn test_short_duration_fails() {
        let t = ValidationThresholds::direct();
        assert!(validate_measurements(GIB, GIB, Some(9.9), Some(9.9), 1, &t).is_err());
    }

    #[test]
    fn test_unprobeable_ts_skips_ratio_checks() {
        let t = ValidationThresholds::proxied();
        assert!(validate_measurements(GIB, 0, Some(100.0), None, 1, &t).is_ok());
    }

    #[test]
    fn test_tiny_mp4_fails() {
        let t = ValidationThresholds::direct();
        assert!(validate_measurements(1024, 2048, Some(100.0), Some(100.0), 1, &t).is_err());
    }
}
