//! Bounded reconnection policy.
//!
//! After an unexpected close the channel schedules a reconnect after a delay,
//! up to `max_attempts` times. A successful open resets the count. Once the
//! budget is spent the channel gives up and stays down until the caller
//! connects again.

use std::time::Duration;

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before each reconnect attempt.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(3000);

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Same delay before every attempt.
    #[default]
    Fixed,
    /// Delay doubles per attempt, capped at `max_delay`. A `max_delay` below
    /// the base delay holds the delay at the base.
    Exponential {
        /// Upper bound for the grown delay.
        max_delay: Duration,
    },
}

/// Policy controlling reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnect attempts after a drop. Zero disables
    /// reconnecting.
    pub max_attempts: u32,
    /// Delay used before the first attempt.
    pub base_delay: Duration,
    /// Delay growth.
    pub backoff: Backoff,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            backoff: Backoff::Fixed,
        }
    }
}

impl ReconnectPolicy {
    /// Delay to wait before the given attempt.
    ///
    /// `attempt` is 1-based.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.base_delay,
            Backoff::Exponential { max_delay } => {
                let ceiling = max_delay.max(self.base_delay);
                let mut delay = self.base_delay;
                for _ in 1..attempt {
                    delay = delay.saturating_mul(2).min(ceiling);
                }
                delay
            }
        }
    }
}

/// What to do after an unexpected close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Open again after `delay`. `attempt` is 1-based.
    Retry {
        /// Attempt number being scheduled.
        attempt: u32,
        /// Wait before opening.
        delay: Duration,
    },
    /// Budget exhausted.
    GiveUp {
        /// Attempts made since the last successful open.
        attempts: u32,
    },
}

/// Attempt counter driven by connection events.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl ReconnectState {
    /// Create a counter at zero.
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// The policy in use.
    #[must_use]
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Attempts made since the last reset.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Called when a connection closes without being asked to, or an open
    /// attempt fails.
    pub fn on_unexpected_close(&mut self) -> ReconnectDecision {
        if self.attempts >= self.policy.max_attempts {
            return ReconnectDecision::GiveUp {
                attempts: self.attempts,
            };
        }
        self.attempts += 1;
        ReconnectDecision::Retry {
            attempt: self.attempts,
            delay: self.policy.delay_for_attempt(self.attempts),
        }
    }

    /// Called on a successful open, or when the caller starts over.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
