use std::fmt;

use serde::Serialize;

/// Supervisor lifecycle states for one camera view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    /// No transport instance exists
    Idle,
    /// A transport instance is negotiating
    Connecting,
    /// The transport delivered its first frame or reached connected
    Connected,
    /// Connection lost, a retry timer is pending
    Reconnecting { attempt: u32 },
    /// Retries exhausted; waits for a manual trigger
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Connecting => write!(f, "CONNECTING"),
            Self::Connected => write!(f, "CONNECTED"),
            Self::Reconnecting { attempt } => write!(f, "RECONNECTING (attempt {})", attempt),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl LifecycleState {
    /// Convert state to numeric value for metrics
    pub fn as_metric(&self) -> f64 {
        match self {
            Self::Idle => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Reconnecting { .. } => 3.0,
            Self::Failed => 4.0,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Transport failures are only acted upon in these states
    pub fn accepts_failure(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::Idle
    }
}
