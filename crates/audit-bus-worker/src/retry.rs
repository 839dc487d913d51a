//! Connection retry policy.
//!
//! The policy is a pure state machine: [`ReconnectState::on_failure`] says
//! whether to try again and after how long, and the caller does the
//! sleeping. This keeps the retry arithmetic testable without a clock.

use std::time::Duration;

/// Default number of connection attempts before giving up: the first attempt
/// plus ten retries.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 11;

/// Default delay between connection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);

/// How the delay between attempts evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failure.
    Fixed(Duration),

    /// Delay doubles after every failure, starting at `initial` and never
    /// exceeding `max`.
    Exponential {
        /// Delay after the first failure.
        initial: Duration,
        /// Upper bound on the delay.
        max: Duration,
    },
}

/// Bounded retry policy for connecting and subscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Delay schedule between attempts.
    pub backoff: Backoff,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(DEFAULT_RETRY_DELAY, DEFAULT_MAX_ATTEMPTS)
    }
}

impl ReconnectPolicy {
    /// Fixed delay between at most `max_attempts` attempts.
    pub const fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(delay),
        }
    }

    /// Capped exponential delay between at most `max_attempts` attempts.
    pub const fn exponential(initial: Duration, max: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Exponential { initial, max },
        }
    }

    /// Returns the delay to wait after the `failure`-th consecutive failure
    /// (1-based).
    pub fn delay_after(&self, failure: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let exponent = failure.saturating_sub(1).min(31);
                initial.saturating_mul(1 << exponent).min(max)
            }
        }
    }

    /// Starts tracking a new sequence of attempts.
    pub const fn start(&self) -> ReconnectState {
        ReconnectState {
            policy: *self,
            failures: 0,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then try again.
    RetryAfter(Duration),

    /// Stop; every allowed attempt has failed.
    GiveUp {
        /// Attempts made.
        attempts: u32,
    },
}

/// Progress through one sequence of attempts.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    policy: ReconnectPolicy,
    failures: u32,
}

impl ReconnectState {
    /// Records a failed attempt and decides what happens next.
    pub fn on_failure(&mut self) -> RetryDecision {
        self.failures = self.failures.saturating_add(1);
        if self.failures >= self.policy.max_attempts.max(1) {
            RetryDecision::GiveUp {
                attempts: self.failures,
            }
        } else {
            RetryDecision::RetryAfter(self.policy.delay_after(self.failures))
        }
    }

    /// Number of failed attempts so far.
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    /// Maximum attempts allowed.
    pub const fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }
}
