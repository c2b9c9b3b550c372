use serde::{Serialize, Serializer};

use super::StreamMode;
use crate::domain::errors::DomainError;

/// Immutable view state published by the supervisor.
///
/// Every transition replaces the whole value, so observers never see a
/// partially updated state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub is_connected: bool,
    pub is_loading: bool,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<DomainError>,
    pub mode: StreamMode,
}

fn serialize_error<S: Serializer>(
    error: &Option<DomainError>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

impl ConnectionState {
    pub fn idle(mode: StreamMode) -> Self {
        Self {
            is_connected: false,
            is_loading: false,
            error: None,
            mode,
        }
    }

    pub fn loading(mode: StreamMode) -> Self {
        Self {
            is_loading: true,
            ..Self::idle(mode)
        }
    }

    pub fn connected(mode: StreamMode) -> Self {
        Self {
            is_connected: true,
            ..Self::idle(mode)
        }
    }

    /// Retry pending after a failure; the error stays visible while loading
    pub fn retrying(mode: StreamMode, error: DomainError) -> Self {
        Self {
            is_loading: true,
            error: Some(error),
            ..Self::idle(mode)
        }
    }

    /// Terminal state rendered by the view as a retry affordance
    pub fn failed(mode: StreamMode, error: DomainError) -> Self {
        Self {
            error: Some(error),
            ..Self::idle(mode)
        }
    }

    /// Whether the view should offer a manual retry button
    pub fn shows_retry(&self) -> bool {
        self.error.is_some() && !self.is_loading
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::idle(StreamMode::default())
    }
}
