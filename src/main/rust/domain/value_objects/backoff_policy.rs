use std::time::Duration;

use crate::domain::errors::{DomainError, Result};

/// Backoff configuration for reconnection attempts
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    max_attempts: u32,
}

impl BackoffPolicy {
    pub fn new(
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
        max_attempts: u32,
    ) -> Result<Self> {
        if multiplier <= 1.0 {
            return Err(DomainError::InvalidBackoffMultiplier);
        }

        if max_attempts == 0 {
            return Err(DomainError::InvalidMaxAttempts);
        }

        Ok(Self {
            initial_delay,
            max_delay,
            multiplier,
            max_attempts,
        })
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Automatic retries allowed per mode before it counts as exhausted
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Calculate the next backoff delay based on current delay
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next = Duration::from_secs_f64(current.as_secs_f64() * self.multiplier);
        next.min(self.max_delay)
    }

    /// Delay before retry number `attempt` (0-based): `min(initial * multiplier^attempt, max)`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        (0..attempt).fold(self.initial_delay.min(self.max_delay), |delay, _| {
            self.next_delay(delay)
        })
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}
