//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

use crate::errors::ProviderError;

/// Retry budget and backoff shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry, before jitter
    pub base_delay: Duration,
    /// No delay ever exceeds this
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Policy that fails on the first error
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Un-jittered delay for `attempt` (0 is the first retry)
    pub fn exponential(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base_delay.saturating_mul(factor)
    }

    /// Delay for `attempt` given a jitter fraction in `[0, 1)`
    ///
    /// `min(base * 2^attempt + fraction * 0.5 * base * 2^attempt, cap)`
    pub fn delay_with_jitter(&self, attempt: u32, fraction: f64) -> Duration {
        let exponential = self.exponential(attempt);
        let jitter = exponential.mul_f64(0.5 * fraction.clamp(0.0, 1.0));
        exponential.saturating_add(jitter).min(self.max_delay)
    }

    /// Randomized delay for `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let fraction = rand::rng().random_range(0.0..1.0);
        self.delay_with_jitter(attempt, fraction)
    }

    /// Delay before retrying after `error`; a server wait hint raises it
    pub fn delay_for(&self, attempt: u32, error: &ProviderError) -> Duration {
        let delay = self.delay(attempt);
        match error.retry_after_secs() {
            Some(secs) => delay.max(Duration::from_secs(secs)).min(self.max_delay),
            None => delay,
        }
    }
}
