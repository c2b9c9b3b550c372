use std::sync::Arc;

use super::{RealtimeTransport, SegmentedTransport, SnapshotTransport, TransportContext};
use crate::domain::ports::{PeerConnector, PlayerFactory, SnapshotSocketConnector, Transport};
use crate::domain::value_objects::StreamMode;

/// Builds a fresh transport instance for a mode; instances are never reused
pub trait TransportFactory: Send + Sync {
    fn build(&self, mode: StreamMode) -> Arc<dyn Transport>;
}

/// Mode-specific adapters the transports are built from
#[derive(Clone)]
pub struct TransportPorts {
    pub peers: Arc<dyn PeerConnector>,
    pub players: Arc<dyn PlayerFactory>,
    pub sockets: Arc<dyn SnapshotSocketConnector>,
}

pub struct PortTransportFactory {
    ctx: TransportContext,
    ports: TransportPorts,
}

impl PortTransportFactory {
    pub fn new(ctx: TransportContext, ports: TransportPorts) -> Self {
        Self { ctx, ports }
    }

    pub fn context(&self) -> &TransportContext {
        &self.ctx
    }
}

impl TransportFactory for PortTransportFactory {
    fn build(&self, mode: StreamMode) -> Arc<dyn Transport> {
        match mode {
            StreamMode::Realtime => Arc::new(RealtimeTransport::new(
                self.ctx.clone(),
                self.ports.peers.clone(),
            )),
            StreamMode::SegmentedHttp => Arc::new(SegmentedTransport::new(
                self.ctx.clone(),
                self.ports.players.clone(),
            )),
            StreamMode::Snapshot => Arc::new(SnapshotTransport::new(
                self.ctx.clone(),
                self.ports.sockets.clone(),
            )),
        }
    }
}
