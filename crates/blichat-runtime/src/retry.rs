//! Bounded retry state for live-room sends
//!
//! Each request carries a `RetryState`: attempt count and the delay before
//! the next attempt. Every failure is fed back through `record_failure`,
//! which either schedules another attempt or gives up.

use blichat_core::{EndpointError, RetryPolicy};
use core::time::Duration;

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after the delay
    Retry { attempt: u32, delay: Duration },
    /// Stop; the request has failed
    GiveUp { attempts: u32, reason: GiveUpReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    /// The retry budget is spent
    Exhausted,
    /// The failure cannot be fixed by retrying
    NotRetryable,
}

#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempts: u32,
    next_delay: Duration,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        let next_delay = policy.initial_delay().min(policy.max_delay());
        Self {
            policy,
            attempts: 0,
            next_delay,
        }
    }

    /// Attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay that the next retry would wait
    pub fn next_delay(&self) -> Duration {
        self.next_delay
    }

    /// Record a successful attempt
    pub fn record_success(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }

    /// Record a failed attempt and decide whether to try again
    ///
    /// A throttling response that names its own retry delay is honoured up to
    /// the policy's maximum delay.
    pub fn record_failure(&mut self, error: &EndpointError) -> RetryDecision {
        self.attempts += 1;

        if !error.is_transient() {
            return RetryDecision::GiveUp {
                attempts: self.attempts,
                reason: GiveUpReason::NotRetryable,
            };
        }
        if self.attempts >= self.policy.max_attempts {
            return RetryDecision::GiveUp {
                attempts: self.attempts,
                reason: GiveUpReason::Exhausted,
            };
        }

        let max_delay = self.policy.max_delay();
        let delay = error
            .retry_after()
            .map_or(self.next_delay, |after| after.max(self.next_delay))
            .min(max_delay);

        let grown = self.next_delay.as_millis() as f64 * self.policy.backoff_multiplier;
        self.next_delay = Duration::from_millis(grown as u64).min(max_delay);

        RetryDecision::Retry {
            attempt: self.attempts,
            delay,
        }
    }
}
