//! Delivery retry policy: exponential backoff with a cap and a budget.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// First backoff delay.
    pub base: Duration,
    /// Backoff ceiling.
    pub cap: Duration,
    /// Attempts before the consumer is parked (or removed).
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            cap: Duration::from_secs(60),
            max_attempts: 8,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base doubling per
    /// attempt, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base
            .saturating_mul(1u32 << exponent)
            .min(self.cap)
    }

    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}

/// Per-consumer failure bookkeeping inside a topic worker.
#[derive(Debug, Default)]
pub(crate) struct RetryState {
    pub attempts: u32,
    pub next_attempt: Option<Instant>,
    pub parked: bool,
}

impl RetryState {
    pub fn due(&self, now: Instant) -> bool {
        !self.parked && self.next_attempt.is_none_or(|at| now >= at)
    }
}
