//! Capture command construction.
//!
//! Builds the streamlink invocation for one capture attempt from the
//! resolved configuration. Options whose values contain `=` or spaces
//! are passed as a single `--name=value` token so the child's argument
//! parser cannot split them.

use std::path::Path;

use crate::config::EffectiveConfig;

/// A fully built capture invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CaptureCommand {
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Streamlink binary, overridable for containers with odd layouts.
pub fn streamlink_binary() -> String {
    std::env::var("STREAMLINK_PATH").unwrap_or_else(|_| "streamlink".to_string())
}

/// Build the capture command for a streamer.
///
/// `force` raises timeouts and retry counts to tolerate difficult
/// feeds; it is set for operator-initiated starts.
pub fn build_capture_command(
    config: &EffectiveConfig,
    username: &str,
    ts_path: &Path,
    force: bool,
) -> CaptureCommand {
    let mut args: Vec<String> = vec![
        format!("twitch.tv/{username}"),
        config.quality.clone(),
        "-o".to_string(),
        ts_path.to_string_lossy().to_string(),
        "--twitch-disable-ads".to_string(),
    ];

    if !config.supported_codecs.is_empty() {
        args.push("--twitch-supported-codecs".to_string());
        args.push(config.supported_codecs.join(","));
    }

    // The OAuth header value contains both '=' and a space; it must
    // survive as one token.
    if let Some(token) = &config.oauth_token {
        args.push(format!("--twitch-api-header=Authorization=OAuth {token}"));
    }

    // Stability settings; force mode tolerates worse feeds.
    let (segment_timeout, stream_timeout, attempts, retry_open) = if force {
        ("90", "360", "20", "10")
    } else {
        ("30", "120", "5", "3")
    };
    args.extend(
        [
            "--stream-segment-timeout",
            segment_timeout,
            "--stream-timeout",
            stream_timeout,
            "--stream-segment-attempts",
            attempts,
            "--retry-open",
            retry_open,
            "--hls-live-edge",
            "6",
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    // Each configured proxy gets its tuning independently; streamlink
    // takes the last occurrence of a repeated option.
    if let Some(http) = &config.proxy.http {
        args.push("--http-proxy".to_string());
        args.push(http.clone());
        append_proxy_tuning(&mut args, force);
        args.extend(
            [
                "--hls-segment-stream-data",
                "--stream-segment-threads",
                "2",
                "--hls-playlist-reload-time",
                "segment",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
    }
    if let Some(https) = &config.proxy.https {
        args.push("--https-proxy".to_string());
        args.push(https.clone());
        append_proxy_tuning(&mut args, force);
    }

    CaptureCommand {
        program: streamlink_binary(),
        args,
    }
}

/// Extra buffering and retry headroom for proxied captures: proxy
/// latency otherwise causes segment drops and audio desync.
fn append_proxy_tuning(args: &mut Vec<String>, force: bool) {
    let (segment_timeout, stream_timeout, attempts) = if force {
        ("90", "360", "20")
    } else {
        ("60", "300", "15")
    };
    args.extend(
        [
            "--stream-segment-timeout",
            segment_timeout,
            "--stream-timeout",
            stream_timeout,
            "--stream-segment-attempts",
            attempts,
            "--hls-segment-queue-threshold",
            "8",
            "--hls-live-edge",
            "10",
            "--ringbuffer-size",
            "512M",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::ProxyConfig;
    use std::path::PathBuf;

    fn config() -> EffectiveConfig {
        EffectiveConfig {
            quality: "best".to_string(),
            supported_codecs: vec!["h265".to_string(), "h264".to_string()],
            ..EffectiveConfig::default()
        }
    }

    #[test]
    fn test_basic_command_shape() {
        let cmd = build_capture_command(&config(), "alice", &PathBuf::from("/rec/a.ts"), false);
        assert_eq!(cmd.args[0], "twitch.tv/alice");
        assert_eq!(cmd.args[1], "best");
        assert_eq!(cmd.args[2], "-o");
        assert_eq!(cmd.args[3], "/rec/a.ts");
        assert!(cmd.args.contains(&"--twitch-disable-ads".to_string()));
        let codec_pos = cmd
            .args
            .iter()
            .position(|a| a == "--twitch-supported-codecs")
            .unwrap();
        assert_eq!(cmd.args[codec_pos + 1], "h265,h264");
    }

    #[test]
    fn test_oauth_header_is_single_token() {
        let mut cfg = config();
        cfg.oauth_token = Some("secret123".to_string());
        let cmd = build_capture_command(&cfg, "alice", &PathBuf::from("/rec/a.ts"), false);
        assert!(cmd
            .args
            .contains(&"--twitch-api-header=Authorization=OAuth secret123".to_string()));
        // Never split into a separate value token.
        assert!(!cmd.args.contains(&"--twitch-api-header".to_string()));
    }

    #[test]
    fn test_force_mode_raises_retries() {
        let cmd = build_capture_command(&config(), "alice", &PathBuf::from("/rec/a.ts"), true);
        let pos = cmd.args.iter().position(|a| a == "--retry-open").unwrap();
        assert_eq!(cmd.args[pos + 1], "10");
        let pos = cmd
            .args
            .iter()
            .position(|a| a == "--stream-timeout")
            .unwrap();
        assert_eq!(cmd.args[pos + 1], "360");
    }

    #[test]
    fn test_proxy_adds_tuning() {
        let mut cfg = config();
        cfg.proxy = ProxyConfig {
            http: Some("http://proxy:8080".to_string()),
            https: None,
        };
        let cmd = build_capture_command(&cfg, "bob", &PathBuf::from("/rec/b.ts"), false);
        let pos = cmd.args.iter().position(|a| a == "--http-proxy").unwrap();
        assert_eq!(cmd.args[pos + 1], "http://proxy:8080");
        assert!(cmd.args.contains(&"--ringbuffer-size".to_string()));
        assert!(cmd.args.contains(&"--hls-segment-stream-data".to_string()));
    }

    #[test]
    fn test_https_only_proxy_still_tuned() {
        let mut cfg = config();
        cfg.proxy = ProxyConfig {
            http: None,
            https: Some("https://proxy:8443".to_string()),
        };
        let cmd = build_capture_command(&cfg, "bob", &PathBuf::from("/rec/b.ts"), false);
        let pos = cmd.args.iter().position(|a| a == "--https-proxy").unwrap();
        assert_eq!(cmd.args[pos + 1], "https://proxy:8443");
        assert!(cmd.args.contains(&"--ringbuffer-size".to_string()));
        assert!(cmd
            .args
            .contains(&"--hls-segment-queue-threshold".to_string()));
        let pos = cmd
            .args
            .iter()
            .rposition(|a| a == "--stream-segment-attempts")
            .unwrap();
        assert_eq!(cmd.args[pos + 1], "15");
    }

    #[test]
    fn test_no_proxy_no_tuning() {
        let cmd = build_capture_command(&config(), "bob", &PathBuf::from("/rec/b.ts"), false);
        assert!(!cmd.args.contains(&"--http-proxy".to_string()));
        assert!(!cmd.args.contains(&"--https-proxy".to_string()));
        assert!(!cmd.args.contains(&"--ringbuffer-size".to_string()));
    }
}
