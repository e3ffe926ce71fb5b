//! Configuration cache.
//!
//! Thread-safe cache of resolved per-streamer configurations with
//! TTL-based eviction and request deduplication: concurrent resolves
//! for the same streamer share one underlying lookup.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, OnceCell};

use super::service::EffectiveConfig;

/// Default TTL for cached configurations (5 minutes).
const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
struct CacheEntry {
    config: Arc<EffectiveConfig>,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(config: Arc<EffectiveConfig>, ttl: Duration) -> Self {
        Self {
            config,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

pub(super) type InFlightResult = std::result::Result<Arc<EffectiveConfig>, String>;

pub(super) struct InFlightState {
    result: OnceCell<InFlightResult>,
    notify: Notify,
}

impl InFlightState {
    fn new() -> Self {
        Self {
            result: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    pub(super) fn set_result(&self, result: InFlightResult) {
        let _ = self.result.set(result);
        self.notify.notify_waiters();
    }

    pub(super) async fn wait(&self) -> InFlightResult {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }
            let notified = self.notify.notified();
            if let Some(result) = self.result.get() {
                return result.clone();
            }
            notified.await;
        }
    }
}

pub(super) type InFlightRequest = Arc<InFlightState>;

/// TTL cache of resolved streamer configurations.
#[derive(Clone)]
pub struct ConfigCache {
    entries: Arc<DashMap<i64, CacheEntry>>,
    in_flight: Arc<DashMap<i64, InFlightRequest>>,
    ttl: Duration,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, streamer_id: i64) -> Option<Arc<EffectiveConfig>> {
        let entry = self.entries.get(&streamer_id)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove(&streamer_id);
            return None;
        }
        Some(entry.config.clone())
    }

    pub fn insert(&self, streamer_id: i64, config: Arc<EffectiveConfig>) {
        self.entries
            .insert(streamer_id, CacheEntry::new(config, self.ttl));
    }

    /// Drop every cached entry. Called whenever settings are written.
    pub fn invalidate_all(&self) {
        let reason = "configuration cache invalidated".to_string();
        for entry in self.in_flight.iter() {
            entry.value().set_result(Err(reason.clone()));
        }
        self.entries.clear();
        self.in_flight.clear();
    }

    pub fn invalidate(&self, streamer_id: i64) {
        self.entries.remove(&streamer_id);
        if let Some((_, request)) = self.in_flight.remove(&streamer_id) {
            request.set_result(Err(format!(
                "configuration invalidated for streamer {streamer_id}"
            )));
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get or create the in-flight request for a streamer; the boolean
    /// is true for the caller that must perform the resolve.
    pub(super) fn get_or_create_in_flight(&self, streamer_id: i64) -> (InFlightRequest, bool) {
        if let Some(existing) = self.in_flight.get(&streamer_id) {
            return (existing.clone(), false);
        }
        let request = Arc::new(InFlightState::new());
        match self.in_flight.entry(streamer_id) {
            dashmap::mapref::entry::Entry::Occupied(entry) => (entry.get().clone(), false),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(request.clone());
                (request, true)
            }
        }
    }

    pub(super) fn finish_in_flight(&self, streamer_id: i64) {
        self.in_flight.remove(&streamer_id);
    }
}

impl Default for ConfigCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_config() -> Arc<EffectiveConfig> {
        Arc::new(EffectiveConfig::default())
    }

    #[test]
    fn test_insert_get() {
        let cache = ConfigCache::new();
        cache.insert(7, dummy_config());
        assert!(cache.get(7).is_some());
        assert!(cache.get(8).is_none());
    }

    #[test]
    fn test_expiry() {
        let cache = ConfigCache::with_ttl(Duration::from_millis(0));
        cache.insert(7, dummy_config());
        assert!(cache.get(7).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_all() {
        let cache = ConfigCache::new();
        cache.insert(1, dummy_config());
        cache.insert(2, dummy_config());
        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_dedup() {
        let cache = ConfigCache::new();
        let (first, is_new_first) = cache.get_or_create_in_flight(7);
        let (second, is_new_second) = cache.get_or_create_in_flight(7);
        assert!(is_new_first);
        assert!(!is_new_second);

        first.set_result(Ok(dummy_config()));
        assert!(second.wait().await.is_ok());
    }
}
