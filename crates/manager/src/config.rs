//! Manager tuning knobs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Upload manager configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Capacity of the intake queue; `begin_upload` waits while it is full.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum items of one batch uploading at the same time.
    #[serde(default = "default_max_concurrent_items")]
    pub max_concurrent_items: usize,

    /// Extra attempts for an item after a resumable error.
    #[serde(default = "default_resumable_retries")]
    pub resumable_retries: u32,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_queue_capacity() -> usize {
    10
}

fn default_max_concurrent_items() -> usize {
    4
}

fn default_resumable_retries() -> u32 {
    3
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_concurrent_items: default_max_concurrent_items(),
            resumable_retries: default_resumable_retries(),
            retry: RetryConfig::default(),
        }
    }
}

/// Backoff between retries of a resumable item failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Backoff cap, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplier for each subsequent attempt.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Calculates the delay for a given retry number (1-based),
    /// with ±25% jitter so parallel items don't retry in lockstep.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos();
        self.delay_with_offset(attempt, jitter_offset(nanos))
    }

    fn delay_with_offset(&self, attempt: u32, offset: f64) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay().as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay().as_secs_f64());
        let jitter = capped * 0.25;
        Duration::from_secs_f64((capped + jitter * offset).max(0.0))
    }
}

/// Maps the sub-second part of a timestamp onto [-1.0, 1.0).
fn jitter_offset(subsec_nanos: u32) -> f64 {
    f64::from(subsec_nanos) / 1_000_000_000.0 * 2.0 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.max_concurrent_items, 4);
        assert_eq!(config.resumable_retries, 3);
        assert_eq!(config.retry.initial_delay(), Duration::from_millis(500));
        assert_eq!(config.retry.max_delay(), Duration::from_secs(30));
        assert!((config.retry.backoff_factor - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn retry_delay_backoff() {
        let retry = RetryConfig::default();
        // 0.5s, 1s, 2s, ... capped at 30s, each within ±25%.
        let expected_base = [0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 30.0, 30.0];
        for (i, &base) in expected_base.iter().enumerate() {
            let secs = retry.delay_for_attempt((i + 1) as u32).as_secs_f64();
            let lo = base * 0.74;
            let hi = base * 1.26;
            assert!(
                secs >= lo && secs <= hi,
                "attempt {}: {secs:.3}s not in [{lo:.3}, {hi:.3}]",
                i + 1
            );
        }
    }

    #[test]
    fn huge_attempt_is_capped() {
        let retry = RetryConfig::default();
        assert!(retry.delay_for_attempt(u32::MAX) <= Duration::from_secs_f64(30.0 * 1.26));
    }

    #[test]
    fn jitter_spans_both_directions() {
        assert_eq!(jitter_offset(0), -1.0);
        assert!(jitter_offset(500_000_000).abs() < 1e-9);
        assert!(jitter_offset(999_999_999) > 0.99);
        assert!(jitter_offset(999_999_999) < 1.0);
    }

    #[test]
    fn delay_jitter_bounds() {
        let retry = RetryConfig::default();
        let early = retry.delay_with_offset(2, jitter_offset(0));
        let late = retry.delay_with_offset(2, jitter_offset(999_999_999));
        assert_eq!(early, Duration::from_millis(750));
        assert!(late > Duration::from_millis(1240) && late < Duration::from_millis(1250));
    }
}
