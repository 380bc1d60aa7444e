//! Reconnection policy with capped exponential backoff and full jitter.

use std::time::Duration;

use rand::Rng;

/// Computes the delay before each reconnect attempt.
///
/// The n-th delay is drawn uniformly from `0..=min(initial * multiplier^n, max)`.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
    max_attempts: u32,
    current_attempt: u32,
}

impl ReconnectPolicy {
    /// Create a policy. `multiplier` below 1 is treated as 1.
    pub fn new(
        initial_backoff: Duration,
        max_backoff: Duration,
        multiplier: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
            multiplier: multiplier.max(1.0),
            max_attempts,
            current_attempt: 0,
        }
    }

    /// The upper bound of the next delay, without jitter.
    pub fn ceiling(&self) -> Duration {
        let base = self.initial_backoff.as_secs_f64();
        let exp = i32::try_from(self.current_attempt).unwrap_or(i32::MAX);
        let scaled = base * self.multiplier.powi(exp);
        if scaled.is_finite() && scaled < self.max_backoff.as_secs_f64() {
            Duration::from_secs_f64(scaled)
        } else {
            self.max_backoff
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }
        let ceiling = self.ceiling();
        self.current_attempt += 1;

        let millis = u64::try_from(ceiling.as_millis()).unwrap_or(u64::MAX);
        Some(Duration::from_millis(rand::rng().random_range(0..=millis)))
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    /// Attempts consumed so far.
    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    /// Attempts allowed before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}
