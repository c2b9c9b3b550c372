use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::domain::value_objects::{BackoffPolicy, LifecycleState, RetryState};

/// Transitions kept for diagnostics; older entries are dropped
const MAX_HISTORY: usize = 64;

/// State transition record
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub timestamp: Instant,
    pub reason: Option<String>,
}

/// What the supervisor should do after a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Schedule one reconnect after `delay`
    Retry { attempt: u32, delay: Duration },
    /// Attempt budget spent for this mode
    Exhausted,
    /// Not in a state where failures count (already retrying, failed or idle)
    Ignored,
}

/// Domain entity representing the connection lifecycle of one camera view
#[derive(Debug)]
pub struct ConnectionLifecycle {
    current_state: LifecycleState,
    retry: RetryState,
    state_history: VecDeque<StateTransition>,
    connected_at: Option<Instant>,
}

impl ConnectionLifecycle {
    pub fn new() -> Self {
        Self {
            current_state: LifecycleState::Idle,
            retry: RetryState::default(),
            state_history: VecDeque::new(),
            connected_at: None,
        }
    }

    pub fn current_state(&self) -> &LifecycleState {
        &self.current_state
    }

    pub fn retry_state(&self) -> RetryState {
        self.retry
    }

    /// Time since the current connection was established
    pub fn uptime(&self) -> Option<Duration> {
        self.connected_at.map(|start| start.elapsed())
    }

    pub fn transition_count(&self) -> usize {
        self.state_history.len()
    }

    pub fn last_transition(&self) -> Option<&StateTransition> {
        self.state_history.back()
    }

    pub fn transition_to_idle(&mut self, reason: Option<String>) {
        self.connected_at = None;
        self.record_transition(LifecycleState::Idle, reason);
    }

    pub fn transition_to_connecting(&mut self) {
        self.record_transition(LifecycleState::Connecting, None);
    }

    /// Connected resets the retry budget
    pub fn transition_to_connected(&mut self) {
        self.retry.reset();
        self.connected_at = Some(Instant::now());
        self.record_transition(LifecycleState::Connected, None);
    }

    pub fn transition_to_failed(&mut self, reason: Option<String>) {
        self.connected_at = None;
        self.record_transition(LifecycleState::Failed, reason);
    }

    /// Fresh budget for a manual reconnect or a mode change
    pub fn reset_retries(&mut self) {
        self.retry.reset();
    }

    /// Pure business rule: account for a transport failure
    pub fn record_failure(&mut self, policy: &BackoffPolicy, reason: String) -> FailureOutcome {
        if !self.current_state.accepts_failure() {
            return FailureOutcome::Ignored;
        }

        self.connected_at = None;
        match self.retry.record_failure(policy) {
            Some(delay) => {
                let attempt = self.retry.attempt_count;
                self.record_transition(LifecycleState::Reconnecting { attempt }, Some(reason));
                FailureOutcome::Retry { attempt, delay }
            }
            None => {
                self.record_transition(LifecycleState::Failed, Some(reason));
                FailureOutcome::Exhausted
            }
        }
    }

    fn record_transition(&mut self, new_state: LifecycleState, reason: Option<String>) {
        let transition = StateTransition {
            from: self.current_state,
            to: new_state,
            timestamp: Instant::now(),
            reason,
        };

        if self.state_history.len() == MAX_HISTORY {
            self.state_history.pop_front();
        }
        self.state_history.push_back(transition);
        self.current_state = new_state;
    }
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
