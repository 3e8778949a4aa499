// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reconnect backoff.

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectConfig;

/// Capped exponential backoff with optional jitter.
///
/// Delay for attempt `n` (1-based) is `initial_delay * multiplier^(n-1)`,
/// capped at `max_delay`, then spread by `±jitter` of itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Multiplier for each attempt.
    pub multiplier: f64,
    /// Jitter factor (0.0 = none, 1.0 = up to 100%).
    pub jitter: f64,
}

impl Backoff {
    /// Creates a backoff without jitter.
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
            jitter: 0.0,
        }
    }

    /// Sets the jitter factor.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Returns the delay before retry `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        let capped = if base.is_finite() { base.min(max) } else { max };

        let delay = if self.jitter > 0.0 {
            let range = capped * self.jitter;
            let jitter = rand::thread_rng().gen_range(-range..=range);
            (capped + jitter).clamp(0.0, max)
        } else {
            capped
        };

        Duration::from_secs_f64(delay)
    }
}

impl From<&ReconnectConfig> for Backoff {
    fn from(config: &ReconnectConfig) -> Self {
        Backoff::new(config.initial_delay, config.max_delay, config.multiplier)
            .with_jitter(config.jitter)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: Duration, expected_ms: u64) {
        let diff = (actual.as_secs_f64() * 1000.0 - expected_ms as f64).abs();
        assert!(diff < 0.001, "expected {}ms, got {:?}", expected_ms, actual);
    }

    #[test]
    fn test_delays_grow_and_cap() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 2.0);
        assert_close(backoff.delay(1), 100);
        assert_close(backoff.delay(2), 200);
        assert_close(backoff.delay(3), 400);
        assert_close(backoff.delay(4), 800);
        assert_close(backoff.delay(5), 1000);
        assert_close(backoff.delay(500), 1000);
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let backoff =
            Backoff::new(Duration::from_millis(1000), Duration::from_secs(10), 2.0).with_jitter(0.5);
        for _ in 0..100 {
            let delay = backoff.delay(1);
            assert!(delay >= Duration::from_millis(499));
            assert!(delay <= Duration::from_millis(1501));
        }
    }

    #[test]
    fn test_jitter_never_exceeds_cap() {
        let backoff =
            Backoff::new(Duration::from_secs(1), Duration::from_secs(2), 2.0).with_jitter(1.0);
        for _ in 0..100 {
            assert!(backoff.delay(10) <= Duration::from_secs(2));
        }
    }

    #[test]
    fn test_from_config() {
        let backoff = Backoff::from(&ReconnectConfig::default());
        assert_eq!(backoff.initial_delay, Duration::from_millis(500));
        assert_eq!(backoff.jitter, 0.1);
    }
}
