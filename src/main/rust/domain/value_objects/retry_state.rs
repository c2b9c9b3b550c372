use std::time::Duration;

use serde::Serialize;

use super::BackoffPolicy;

/// Retry bookkeeping for the active mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryState {
    pub attempt_count: u32,
    pub next_delay_ms: u64,
}

impl RetryState {
    /// Record a failure and return the delay for the scheduled retry, or
    /// `None` once the policy's attempt budget is spent.
    pub fn record_failure(&mut self, policy: &BackoffPolicy) -> Option<Duration> {
        if self.is_exhausted(policy) {
            return None;
        }

        let delay = policy.delay_for_attempt(self.attempt_count);
        self.attempt_count += 1;
        self.next_delay_ms = delay.as_millis() as u64;
        Some(delay)
    }

    pub fn is_exhausted(&self, policy: &BackoffPolicy) -> bool {
        self.attempt_count >= policy.max_attempts()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
