//! ffprobe/ffmpeg helpers shared by pipeline handlers.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::{Error, Result};

pub fn ffmpeg_binary() -> String {
    std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string())
}

pub fn ffprobe_binary() -> String {
    std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string())
}

/// Container facts reported by ffprobe.
#[derive(Debug, Clone, Default)]
pub struct ProbeResult {
    pub duration_secs: Option<f64>,
    pub video_streams: usize,
    pub audio_streams: usize,
}

#[derive(Deserialize)]
struct RawProbe {
    #[serde(default)]
    format: Option<RawFormat>,
    #[serde(default)]
    streams: Vec<RawStream>,
}

#[derive(Deserialize)]
struct RawFormat {
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Deserialize)]
struct RawStream {
    #[serde(default)]
    codec_type: Option<String>,
}

/// Probe a media file for duration and stream layout.
pub async fn probe(path: &Path) -> Result<ProbeResult> {
    let output = Command::new(ffprobe_binary())
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-show_entries",
            "stream=codec_type",
            "-of",
            "json",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::Spawn {
            command: "ffprobe".to_string(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(Error::ValidationFailed(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let raw: RawProbe = serde_json::from_slice(&output.stdout)?;
    let result = ProbeResult {
        duration_secs: raw
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse::<f64>().ok()),
        video_streams: raw
            .streams
            .iter()
            .filter(|s| s.codec_type.as_deref() == Some("video"))
            .count(),
        audio_streams: raw
            .streams
            .iter()
            .filter(|s| s.codec_type.as_deref() == Some("audio"))
            .count(),
    };
    debug!(path = %path.display(), ?result, "Probed media file");
    Ok(result)
}

/// Decode an image to 8-bit grayscale pixels via ffmpeg.
pub async fn decode_gray_pixels(path: &Path) -> Result<Vec<u8>> {
    let output = Command::new(ffmpeg_binary())
        .args(["-v", "error", "-i"])
        .arg(path)
        .args(["-f", "rawvideo", "-pix_fmt", "gray", "pipe:1"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::Spawn {
            command: "ffmpeg".to_string(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(Error::Thumbnail(format!(
            "failed to decode {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output.stdout)
}

/// Whether a grayscale image is a near-uniform placeholder: one small
/// brightness band covering at least `threshold` of the pixels.
pub fn is_uniform_placeholder(pixels: &[u8], threshold: f64) -> bool {
    if pixels.is_empty() {
        return true;
    }

    let mut histogram = [0u64; 256];
    for pixel in pixels {
        histogram[*pixel as usize] += 1;
    }

    // Count the densest ±4 band around any brightness level.
    let mut best = 0u64;
    for center in 0..256usize {
        let lo = center.saturating_sub(4);
        let hi = (center + 4).min(255);
        let band: u64 = histogram[lo..=hi].iter().sum();
        best = best.max(band);
    }

    (best as f64 / pixels.len() as f64) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_gray_is_placeholder() {
        let pixels = vec![128u8; 10_000];
        assert!(is_uniform_placeholder(&pixels, 0.7));
    }

    #[test]
    fn test_noisy_image_is_not_placeholder() {
        let pixels: Vec<u8> = (0..10_000).map(|i| (i % 256) as u8).collect();
        assert!(!is_uniform_placeholder(&pixels, 0.7));
    }

    #[test]
    fn test_mostly_uniform_with_small_overlay() {
        // 75 % flat background with a small bright overlay.
        let mut pixels = vec![90u8; 7_500];
        pixels.extend((0..2_500).map(|i| (i % 256) as u8));
        assert!(is_uniform_placeholder(&pixels, 0.7));
        assert!(!is_uniform_placeholder(&pixels, 0.8));
    }

    #[test]
    fn test_empty_image_is_placeholder() {
        assert!(is_uniform_placeholder(&[], 0.7));
    }
}
