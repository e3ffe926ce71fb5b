//! Retry policy value object.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for transient errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Jitter fraction applied to delays (0.0 disables jitter).
    pub jitter: f64,
}

impl RetryPolicy {
    /// Policy used by pipeline tasks: base 30 s, cap 10 min, ±20 % jitter.
    pub fn pipeline() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 30_000,
            max_delay_ms: 600_000,
            backoff_multiplier: 2.0,
            jitter: 0.2,
        }
    }

    /// Policy used for Twitch 5xx/transport retries.
    pub fn twitch_api() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: 0.25,
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::pipeline()
        }
    }

    /// Delay before the given retry attempt (0-indexed), with jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt.min(24) as i32);
        let capped = base.min(self.max_delay_ms as f64);

        if self.jitter > 0.0 {
            // Symmetric jitter: delay * (1 ± jitter)
            let spread = capped * self.jitter;
            let offset = (rand::random::<f64>() * 2.0 - 1.0) * spread;
            Duration::from_millis((capped + offset).max(0.0) as u64)
        } else {
            Duration::from_millis(capped as u64)
        }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::twitch_api()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_policy_bounds() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::pipeline()
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(60_000));
        // Capped at ten minutes.
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(600_000));
    }

    #[test]
    fn test_jitter_within_window() {
        let policy = RetryPolicy::pipeline();
        for _ in 0..50 {
            let delay = policy.delay_for_attempt(0).as_millis() as f64;
            assert!((24_000.0..=36_000.0).contains(&delay), "delay {delay} out of window");
        }
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::pipeline();
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::no_retry().should_retry(0));
    }
}
