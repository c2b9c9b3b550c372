use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::IceCandidatePayload;
use crate::domain::errors::Result;

/// Label of the data channel used for liveness pings
pub const LIVENESS_CHANNEL_LABEL: &str = "liveness";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerConfig {
    pub stun_servers: Vec<String>,
}

/// Peer connection state as reported by the WebRTC stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerState {
    /// States that end the peer for good
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Inbound media track. Packets stop when the peer closes or the receiver is dropped.
#[derive(Debug)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
    pub mime_type: String,
    pub packets: mpsc::UnboundedReceiver<Bytes>,
}

/// Everything a peer link reports back to its owner
#[derive(Debug)]
pub enum PeerEvent {
    IceCandidate(IceCandidatePayload),
    Track(RemoteTrack),
    StateChanged(PeerState),
    LivenessOpen,
    LivenessMessage(String),
    LivenessClosed,
}

/// A single negotiated peer connection, receive-only video
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Create the liveness data channel; `PeerEvent::LivenessOpen` follows once usable
    async fn open_liveness_channel(&self) -> Result<()>;

    /// Build a recvonly video offer, apply it locally and return its SDP
    async fn create_offer(&self) -> Result<String>;

    async fn apply_answer(&self, sdp: String) -> Result<()>;

    async fn send_liveness(&self, message: String) -> Result<()>;

    async fn close_liveness_channel(&self);

    /// Close the peer connection and stop every inbound track
    async fn close(&self);
}

/// Factory for peer links
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn create(
        &self,
        config: PeerConfig,
    ) -> Result<(Arc<dyn PeerLink>, mpsc::UnboundedReceiver<PeerEvent>)>;
}
