//! Configuration entities, read-only inputs to the config resolver.

use serde::{Deserialize, Serialize};

/// Global, instance-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Default capture quality (e.g. "best", "720p").
    pub default_quality: String,
    /// Ordered codec preference list (e.g. ["h265", "h264"]).
    pub supported_codecs: Vec<String>,
    /// Filename template or preset name.
    pub filename_template: String,
    /// HTTP proxy URL, empty for none.
    pub http_proxy: String,
    /// HTTPS proxy URL, empty for none.
    pub https_proxy: String,
    /// Whether the proxy pre-flight probe runs before captures.
    pub proxy_preflight: bool,
    /// Streams retained per streamer; 0 keeps everything.
    pub max_streams_per_streamer: i64,
    /// System-wide cap on simultaneous recordings.
    pub max_concurrent_recordings: usize,
    /// Twitch OAuth token enabling authenticated quality/codec tiers.
    pub oauth_token: Option<String>,
    /// Apply proxy-regime validation thresholds even without a proxy.
    pub strict_no_proxy_validation: bool,
    /// Root directory for recordings.
    pub recordings_root: String,
    /// Persisted tracing filter directive, empty for the default.
    pub log_filter_directive: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            default_quality: "best".to_string(),
            supported_codecs: vec!["h264".to_string()],
            filename_template: "default".to_string(),
            http_proxy: String::new(),
            https_proxy: String::new(),
            proxy_preflight: true,
            max_streams_per_streamer: 0,
            max_concurrent_recordings: 8,
            oauth_token: None,
            strict_no_proxy_validation: false,
            recordings_root: "recordings".to_string(),
            log_filter_directive: String::new(),
        }
    }
}

/// Per-streamer recording overrides. `None` fields fall through to the
/// global settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamerRecordingSettings {
    pub streamer_id: i64,
    pub quality: Option<String>,
    pub supported_codecs: Option<Vec<String>>,
    pub filename_template: Option<String>,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub max_streams: Option<i64>,
    pub oauth_token: Option<String>,
}

/// Notification preferences. Dispatch itself is an external collaborator;
/// the core only persists and exposes these.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub streamer_id: i64,
    pub notify_online: bool,
    pub notify_offline: bool,
    pub notify_update: bool,
    pub notify_favorite_category: bool,
}
