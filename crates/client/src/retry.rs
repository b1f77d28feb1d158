//! Retry scheduling.
//!
//! A [`RetryPolicy`] is pure: it only answers how long to wait before a given
//! attempt, or that no further attempt is allowed. Callers own the loop.

use std::time::Duration;

/// How the delay grows with the attempt number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base_delay * attempt`
    Linear,
    /// `base_delay * 2^(attempt - 1)`
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn linear(base_delay: Duration, max_attempts: u32) -> Self {
        Self { base_delay, max_attempts, backoff: Backoff::Linear }
    }

    pub fn exponential(base_delay: Duration, max_attempts: u32) -> Self {
        Self { base_delay, max_attempts, backoff: Backoff::Exponential }
    }

    /// Delay associated with `attempt` (1-based).
    ///
    /// Returns `None` once `attempt` exceeds `max_attempts`, or for attempt 0.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }

        let factor = match self.backoff {
            Backoff::Linear => attempt,
            Backoff::Exponential => 2u32.saturating_pow(attempt - 1),
        };
        Some(self.base_delay.saturating_mul(factor))
    }

    /// Sum of the delays of every allowed attempt.
    pub fn total_delay(&self) -> Duration {
        (1..=self.max_attempts).filter_map(|attempt| self.delay_for(attempt)).sum()
    }
}
