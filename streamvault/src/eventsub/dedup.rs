//! EventSub delivery deduplication.
//!
//! Twitch redelivers notifications it believes were not acknowledged;
//! repeated deliveries inside a bounded window are dropped by keying on
//! (message id, broadcaster id, event type). Eviction is lazy on
//! insert, so memory stays proportional to the event rate.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default dedup window.
const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    message_id: String,
    broadcaster_id: String,
    event_type: String,
}

/// Bounded-window duplicate detector for EventSub deliveries.
pub struct EventDeduplicator {
    seen: Mutex<HashMap<Key, Instant>>,
    ttl: Duration,
}

impl EventDeduplicator {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Record a delivery, returning whether it was already seen inside
    /// the window. Missing fields never dedup.
    pub fn seen(&self, message_id: &str, broadcaster_id: &str, event_type: &str) -> bool {
        if message_id.is_empty() || broadcaster_id.is_empty() || event_type.is_empty() {
            return false;
        }

        let key = Key {
            message_id: message_id.to_string(),
            broadcaster_id: broadcaster_id.to_string(),
            event_type: event_type.to_string(),
        };

        let now = Instant::now();
        let mut seen = self.seen.lock();
        seen.retain(|_, inserted| now.duration_since(*inserted) < self.ttl);

        match seen.get(&key) {
            Some(_) => true,
            None => {
                seen.insert(key, now);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

impl Default for EventDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_delivery_is_duplicate() {
        let dedup = EventDeduplicator::new();
        assert!(!dedup.seen("m1", "111", "stream.online"));
        assert!(dedup.seen("m1", "111", "stream.online"));
    }

    #[test]
    fn test_distinct_dimensions_are_not_duplicates() {
        let dedup = EventDeduplicator::new();
        assert!(!dedup.seen("m1", "111", "stream.online"));
        assert!(!dedup.seen("m2", "111", "stream.online"));
        assert!(!dedup.seen("m1", "222", "stream.online"));
        assert!(!dedup.seen("m1", "111", "stream.offline"));
    }

    #[test]
    fn test_missing_fields_never_dedup() {
        let dedup = EventDeduplicator::new();
        assert!(!dedup.seen("", "111", "stream.online"));
        assert!(!dedup.seen("", "111", "stream.online"));
        assert!(!dedup.seen("m1", "", "stream.online"));
        assert!(!dedup.seen("m1", "111", ""));
        assert!(dedup.is_empty());
    }

    #[test]
    fn test_expired_entries_are_evicted() {
        let dedup = EventDeduplicator::with_ttl(Duration::from_millis(0));
        assert!(!dedup.seen("m1", "111", "stream.online"));
        // The zero TTL expires the entry immediately.
        assert!(!dedup.seen("m1", "111", "stream.online"));
        std::thread::sleep(Duration::from_millis(1));
        dedup.seen("m2", "111", "stream.online");
        assert_eq!(dedup.len(), 1);
    }
}
