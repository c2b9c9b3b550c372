use thiserror::Error;

use crate::domain::value_objects::{CameraId, StreamMode};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Invalid backend URL: {0}")]
    InvalidBackendUrl(String),

    #[error("Invalid backoff multiplier: must be > 1.0")]
    InvalidBackoffMultiplier,

    #[error("Invalid max attempts: must be at least 1")]
    InvalidMaxAttempts,

    #[error("Invalid {0} interval: must be greater than zero")]
    InvalidInterval(&'static str),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Transport state error: {0}")]
    TransportState(String),

    #[error("Frame decode failed: {0}")]
    Decode(String),

    #[error("Player error: {0}")]
    Player(String),

    #[error("Candidate relay failed: {0}")]
    Relay(String),

    #[error("Keep-alive failed: {0}")]
    KeepAlive(String),

    #[error("Session release failed: {0}")]
    Release(String),

    #[error("Backend returned {status} for {endpoint}")]
    HttpStatus { endpoint: String, status: u16 },

    #[error("Request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("Malformed backend response from {endpoint}: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    #[error("A connection attempt is already in flight")]
    ConnectInFlight,

    #[error("Transport has been destroyed")]
    Destroyed,

    #[error("Camera {0} is not active")]
    CameraInactive(CameraId),

    #[error("No camera selected")]
    NoCamera,

    #[error("Stream modes exhausted (last tried {mode}): {reason}")]
    Exhausted { mode: StreamMode, reason: String },

    #[error("Supervisor is shut down")]
    SupervisorClosed,
}

/// How a failure propagates through the transports and the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Ends the current transport instance; the supervisor retries
    Fatal,
    /// Retried in place by the transport
    Transient,
    /// Logged only, never changes connection state
    NonFatal,
    /// Rejected up front (configuration or caller misuse)
    Rejected,
}

impl DomainError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Negotiation(_)
            | Self::TransportState(_)
            | Self::Player(_)
            | Self::HttpStatus { .. }
            | Self::Request { .. }
            | Self::MalformedResponse { .. }
            | Self::Exhausted { .. } => ErrorClass::Fatal,
            Self::Decode(_) => ErrorClass::Transient,
            Self::Relay(_) | Self::KeepAlive(_) | Self::Release(_) => ErrorClass::NonFatal,
            Self::InvalidBackendUrl(_)
            | Self::InvalidBackoffMultiplier
            | Self::InvalidMaxAttempts
            | Self::InvalidInterval(_)
            | Self::ConnectInFlight
            | Self::Destroyed
            | Self::CameraInactive(_)
            | Self::NoCamera
            | Self::SupervisorClosed => ErrorClass::Rejected,
        }
    }

    /// True when the backend reported the resource as gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 404, .. })
    }

    /// Re-tag a backend failure as a negotiation error, keeping the message
    pub fn into_negotiation(self) -> Self {
        match self {
            Self::Negotiation(_) => self,
            other => Self::Negotiation(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
