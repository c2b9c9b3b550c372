use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::errors::Result;
use crate::domain::value_objects::CameraId;

/// Messages the client sends on the snapshot socket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Ping { timestamp: u64 },
    Pong { timestamp: u64 },
}

/// Messages the backend pushes on the snapshot socket
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Snapshot {
        data: String,
        #[serde(default)]
        timestamp: Option<f64>,
    },
    Pong {
        #[serde(default)]
        timestamp: Option<f64>,
    },
    Ping {
        #[serde(default)]
        timestamp: Option<f64>,
    },
    Info {
        #[serde(default)]
        message: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Message(ServerMessage),
    /// Text frame that did not parse as a known message
    Malformed(String),
    Closed { abnormal: bool, reason: String },
}

/// An open push socket. Dropping `outbound` closes the connection;
/// aborting `reader` stops inbound delivery without waiting for the server.
#[derive(Debug)]
pub struct SnapshotSocket {
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    pub inbound: mpsc::UnboundedReceiver<SocketEvent>,
    pub reader: JoinHandle<()>,
}

#[async_trait]
pub trait SnapshotSocketConnector: Send + Sync {
    async fn open(&self, camera_id: CameraId) -> Result<SnapshotSocket>;
}
