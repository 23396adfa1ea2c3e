//! Retry policy shared by every network step
//!
//! The policy only answers "retry, and after how long?"; the async loops
//! that sleep and repeat live in the adapter and transfer crates.

use std::time::Duration;

/// Outcome of asking the policy about a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait this long, then try again
    RetryAfter(Duration),
    /// Attempt ceiling reached
    GiveUp,
}

/// Capped exponential backoff with an optional attempt ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: Option<u32>,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first attempt; `None` never gives up.
    pub fn new(max_attempts: Option<u32>, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn unbounded(base_delay: Duration, max_delay: Duration) -> Self {
        Self::new(None, base_delay, max_delay)
    }

    pub fn bounded(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self::new(Some(max_attempts.max(1)), base_delay, max_delay)
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Backoff before retry number `retry` (0 for the first retry):
    /// `min(base * 2^retry, max_delay)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// True if another attempt is allowed after `attempts_made` failures.
    pub fn should_retry(&self, attempts_made: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts_made < max,
            None => true,
        }
    }

    /// Decide what to do after `attempts_made` failed attempts (at least 1).
    pub fn next(&self, attempts_made: u32) -> RetryDecision {
        if self.should_retry(attempts_made) {
            RetryDecision::RetryAfter(self.delay_for(attempts_made.saturating_sub(1)))
        } else {
            RetryDecision::GiveUp
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(Duration::from_secs(1), Duration::from_secs(60))
    }
}
