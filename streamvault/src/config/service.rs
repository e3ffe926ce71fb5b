//! Effective configuration resolution with streamer overrides layered
//! over global settings, then compiled defaults.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cache::ConfigCache;
use crate::database::repositories::{SettingsRepository, StreamerRepository};
use crate::domain::value_objects::ProxyConfig;
use crate::domain::{GlobalSettings, StreamerRecordingSettings};
use crate::{Error, Result};

/// The fully resolved configuration for one streamer's captures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub recording_enabled: bool,
    pub quality: String,
    pub supported_codecs: Vec<String>,
    pub filename_template: String,
    pub proxy: ProxyConfig,
    pub proxy_preflight: bool,
    /// Streams retained per streamer; 0 keeps everything.
    pub max_streams: i64,
    pub oauth_token: Option<String>,
    pub recordings_root: PathBuf,
    pub max_concurrent_recordings: usize,
    pub strict_no_proxy_validation: bool,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        let global = GlobalSettings::default();
        Self {
            recording_enabled: true,
            quality: global.default_quality,
            supported_codecs: global.supported_codecs,
            filename_template: global.filename_template,
            proxy: ProxyConfig::default(),
            proxy_preflight: global.proxy_preflight,
            max_streams: global.max_streams_per_streamer,
            oauth_token: None,
            recordings_root: PathBuf::from(global.recordings_root),
            max_concurrent_recordings: global.max_concurrent_recordings,
            strict_no_proxy_validation: global.strict_no_proxy_validation,
        }
    }
}

impl EffectiveConfig {
    /// Layer streamer overrides on top of global settings.
    ///
    /// Proxy URLs are validated here so malformed settings surface as a
    /// `ConfigError` before any capture starts.
    pub fn resolve(
        global: &GlobalSettings,
        overrides: Option<&StreamerRecordingSettings>,
        recording_enabled: bool,
    ) -> Result<Self> {
        let defaults = GlobalSettings::default();

        let quality = overrides
            .and_then(|o| o.quality.clone())
            .unwrap_or_else(|| pick(&global.default_quality, &defaults.default_quality));
        let supported_codecs = overrides
            .and_then(|o| o.supported_codecs.clone())
            .unwrap_or_else(|| {
                if global.supported_codecs.is_empty() {
                    defaults.supported_codecs.clone()
                } else {
                    global.supported_codecs.clone()
                }
            });
        let filename_template = overrides
            .and_then(|o| o.filename_template.clone())
            .unwrap_or_else(|| pick(&global.filename_template, &defaults.filename_template));

        let http_proxy = overrides
            .and_then(|o| o.http_proxy.clone())
            .unwrap_or_else(|| global.http_proxy.clone());
        let https_proxy = overrides
            .and_then(|o| o.https_proxy.clone())
            .unwrap_or_else(|| global.https_proxy.clone());
        let proxy = ProxyConfig::from_settings(&http_proxy, &https_proxy)?;

        Ok(Self {
            recording_enabled,
            quality,
            supported_codecs,
            filename_template,
            proxy,
            proxy_preflight: global.proxy_preflight,
            max_streams: overrides
                .and_then(|o| o.max_streams)
                .unwrap_or(global.max_streams_per_streamer),
            oauth_token: overrides
                .and_then(|o| o.oauth_token.clone())
                .or_else(|| global.oauth_token.clone()),
            recordings_root: PathBuf::from(pick(
                &global.recordings_root,
                &defaults.recordings_root,
            )),
            max_concurrent_recordings: global.max_concurrent_recordings,
            strict_no_proxy_validation: global.strict_no_proxy_validation,
        })
    }
}

fn pick(value: &str, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

/// Object-safe resolution seam for components that only need lookups.
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    async fn resolve(&self, streamer_id: i64) -> Result<Arc<EffectiveConfig>>;
    fn invalidate(&self);
}

/// Service resolving and caching effective configurations.
pub struct ConfigService<S, R> {
    settings_repo: Arc<S>,
    streamer_repo: Arc<R>,
    cache: ConfigCache,
}

impl<S, R> ConfigService<S, R>
where
    S: SettingsRepository + 'static,
    R: StreamerRepository + 'static,
{
    pub fn new(settings_repo: Arc<S>, streamer_repo: Arc<R>) -> Self {
        Self::with_cache(settings_repo, streamer_repo, ConfigCache::new())
    }

    pub fn with_cache(settings_repo: Arc<S>, streamer_repo: Arc<R>, cache: ConfigCache) -> Self {
        Self {
            settings_repo,
            streamer_repo,
            cache,
        }
    }

    /// Resolve the effective configuration for a streamer, served from
    /// cache within the TTL. Concurrent resolves are deduplicated.
    pub async fn resolve(&self, streamer_id: i64) -> Result<Arc<EffectiveConfig>> {
        if let Some(config) = self.cache.get(streamer_id) {
            return Ok(config);
        }

        let (request, is_owner) = self.cache.get_or_create_in_flight(streamer_id);
        if !is_owner {
            return request
                .wait()
                .await
                .map_err(Error::Configuration);
        }

        let result = self.resolve_uncached(streamer_id).await;
        match &result {
            Ok(config) => {
                self.cache.insert(streamer_id, config.clone());
                request.set_result(Ok(config.clone()));
            }
            Err(e) => request.set_result(Err(e.to_string())),
        }
        self.cache.finish_in_flight(streamer_id);
        result
    }

    /// Global settings without streamer layering.
    pub async fn global(&self) -> Result<GlobalSettings> {
        self.settings_repo.global().await
    }

    /// Clear the cache; called whenever settings are written.
    pub fn invalidate(&self) {
        debug!("Invalidating configuration cache");
        self.cache.invalidate_all();
    }

    pub fn invalidate_streamer(&self, streamer_id: i64) {
        self.cache.invalidate(streamer_id);
    }

    async fn resolve_uncached(&self, streamer_id: i64) -> Result<Arc<EffectiveConfig>> {
        let streamer = self.streamer_repo.get(streamer_id).await?;
        let global = self.settings_repo.global().await?;
        let overrides = self.settings_repo.streamer_overrides(streamer_id).await?;
        let config =
            EffectiveConfig::resolve(&global, overrides.as_ref(), streamer.recording_enabled)?;
        Ok(Arc::new(config))
    }
}

#[async_trait]
impl<S, R> ConfigResolver for ConfigService<S, R>
where
    S: SettingsRepository + 'static,
    R: StreamerRepository + 'static,
{
    async fn resolve(&self, streamer_id: i64) -> Result<Arc<EffectiveConfig>> {
        ConfigService::resolve(self, streamer_id).await
    }

    fn invalidate(&self) {
        ConfigService::invalidate(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win_over_global() {
        let global = GlobalSettings {
            default_quality: "best".to_string(),
            supported_codecs: vec!["h264".to_string()],
            ..GlobalSettings::default()
        };
        let overrides = StreamerRecordingSettings {
            streamer_id: 7,
            quality: Some("720p".to_string()),
            supported_codecs: Some(vec!["h265".to_string(), "h264".to_string()]),
            ..StreamerRecordingSettings::default()
        };

        let config = EffectiveConfig::resolve(&global, Some(&overrides), true).unwrap();
        assert_eq!(config.quality, "720p");
        assert_eq!(config.supported_codecs, vec!["h265", "h264"]);
        assert!(config.recording_enabled);
    }

    #[test]
    fn test_empty_global_falls_back_to_defaults() {
        let global = GlobalSettings {
            default_quality: "  ".to_string(),
            filename_template: String::new(),
            ..GlobalSettings::default()
        };
        let config = EffectiveConfig::resolve(&global, None, false).unwrap();
        assert_eq!(config.quality, "best");
        assert_eq!(config.filename_template, "default");
        assert!(!config.recording_enabled);
    }

    #[test]
    fn test_malformed_proxy_is_config_error() {
        let global = GlobalSettings {
            http_proxy: "not-a-proxy".to_string(),
            ..GlobalSettings::default()
        };
        let err = EffectiveConfig::resolve(&global, None, true).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_streamer_proxy_override_replaces_global() {
        let global = GlobalSettings {
            http_proxy: "http://global:8080".to_string(),
            ..GlobalSettings::default()
        };
        let overrides = StreamerRecordingSettings {
            streamer_id: 7,
            http_proxy: Some(String::new()),
            ..StreamerRecordingSettings::default()
        };
        let config = EffectiveConfig::resolve(&global, Some(&overrides), true).unwrap();
        assert!(!config.proxy.is_configured());
    }
}
