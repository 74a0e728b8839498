//! Retry Policy
//!
//! Bounded exponential backoff with jitter for reference source requests.
//! A policy lives for one logical fetch (one hourly open); it is dropped once
//! the fetch succeeds or is abandoned.

use std::time::Duration;

use rand::Rng;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor between consecutive delays.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Retries allowed after the first failure (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 8,
        }
    }
}

/// Stateful backoff sequence.
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    next_base: Duration,
    attempts: u32,
}

impl RetryPolicy {
    /// Start a fresh sequence.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        let next_base = config.initial_delay;
        Self {
            config,
            next_base,
            attempts: 0,
        }
    }

    /// Delay before the next retry, or `None` once the attempts are used up.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }
        self.attempts += 1;

        let delay = self.jittered(self.next_base);

        #[allow(clippy::cast_precision_loss)]
        let grown = self.next_base.as_millis() as f64 * self.config.multiplier;
        let grown = if grown.is_finite() && grown > 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                grown.round() as u128
            }
        } else {
            0
        };
        let capped = grown.min(self.config.max_delay.as_millis());
        self.next_base = Duration::from_millis(u64::try_from(capped).unwrap_or(u64::MAX));

        Some(delay)
    }

    /// Retries handed out so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True when no further retry will be granted.
    #[must_use]
    pub const fn exhausted(&self) -> bool {
        self.config.max_attempts > 0 && self.attempts >= self.config.max_attempts
    }

    fn jittered(&self, base: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return base;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_ms = base.as_millis() as f64;
        let spread = base_ms * self.config.jitter_factor;
        let offset: f64 = rand::rng().random_range(-spread..=spread);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ms = (base_ms + offset).max(1.0) as u64;
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(initial_ms: u64, max_ms: u64, max_attempts: u32) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier: 2.0,
            jitter_factor: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn default_config_values() {
        let config = RetryConfig::default();
        assert_eq!(config.initial_delay, Duration::from_millis(500));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert_eq!(config.max_attempts, 8);
    }

    #[test]
    fn delays_double_until_capped() {
        let mut policy = RetryPolicy::new(exact(100, 500, 0));
        let delays: Vec<u128> = (0..5)
            .map(|_| policy.next_delay().unwrap().as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn stops_after_max_attempts() {
        let mut policy = RetryPolicy::new(exact(10, 100, 2));
        assert!(policy.next_delay().is_some());
        assert!(policy.next_delay().is_some());
        assert!(policy.exhausted());
        assert!(policy.next_delay().is_none());
        assert_eq!(policy.attempts(), 2);
    }

    #[test]
    fn zero_max_attempts_never_exhausts() {
        let mut policy = RetryPolicy::new(exact(1, 2, 0));
        for _ in 0..500 {
            assert!(policy.next_delay().is_some());
        }
        assert!(!policy.exhausted());
    }

    #[test]
    fn jitter_stays_within_bounds() {
        for _ in 0..100 {
            let mut policy = RetryPolicy::new(RetryConfig {
                jitter_factor: 0.1,
                ..exact(1_000, 10_000, 0)
            });
            let ms = policy.next_delay().unwrap().as_millis();
            assert!((900..=1_100).contains(&ms), "delay {ms}ms out of bounds");
        }
    }
}
