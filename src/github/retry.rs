//! Bounded exponential backoff for transient GraphQL failures

use std::time::Duration;

use rand::Rng;

use crate::error::TransportError;

/// Retry policy applied by the transport to every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStrategy {
    /// Base delay for the first retry attempt.
    pub base_delay: Duration,
    /// Maximum delay cap for any retry attempt.
    pub max_delay: Duration,
    /// Maximum number of retries after the initial request.
    pub max_retries: u32,
    /// Percentage of jitter to add to delays (0-100).
    pub jitter_percent: u8,
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            max_retries: 3,
            jitter_percent: 10,
        }
    }
}

impl RetryStrategy {
    /// Creates a new retry strategy with the specified parameters.
    pub fn new(
        base_delay: Duration,
        max_delay: Duration,
        max_retries: u32,
        jitter_percent: u8,
    ) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
            jitter_percent: jitter_percent.min(100),
        }
    }

    /// A strategy that never retries.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, 0, 0)
    }

    /// Delay before retry number `attempt` (1-based).
    ///
    /// `base_delay * 2^(attempt - 1)`, capped at `max_delay`, then spread by
    /// up to `jitter_percent` either way so concurrent jobs do not retry in step.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let backoff = self.backoff(attempt);
        if self.jitter_percent == 0 || backoff.is_zero() {
            return backoff;
        }
        let spread = f64::from(self.jitter_percent) / 100.0;
        let factor = 1.0 + rand::rng().random_range(-spread..=spread);
        Duration::from_secs_f64(backoff.as_secs_f64() * factor)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(1u32 << doublings)
            .min(self.max_delay)
    }

    /// Whether a request that failed with `error` on retry `attempt` should be sent again.
    ///
    /// Mutations are only re-sent when GitHub refused them outright.
    pub fn should_retry(&self, attempt: u32, error: &TransportError, mutation: bool) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        if mutation {
            error.is_rejected_before_execution()
        } else {
            error.is_transient()
        }
    }
}
