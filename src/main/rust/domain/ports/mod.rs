mod media_player;
mod metrics_reporter;
mod peer_connector;
mod playback_surface;
mod snapshot_socket;
mod streaming_backend;
mod transport;

pub use media_player::{MediaPlayer, PlayerEvent, PlayerFactory};
pub use metrics_reporter::{MetricsReporter, NoopReporter};
pub use peer_connector::{LIVENESS_CHANNEL_LABEL, PeerConfig, PeerConnector, PeerEvent, PeerLink, PeerState, RemoteTrack};
pub use playback_surface::{Frame, MediaSink, MediaSource, PlaybackSurfaces, RasterSink};
pub use snapshot_socket::{
    ClientMessage, ServerMessage, SnapshotSocket, SnapshotSocketConnector, SocketEvent,
};
pub use streaming_backend::{
    AnswerResponse, Base64Snapshot, CameraStatus, HlsStream, IceCandidatePayload, OfferRequest,
    StreamingBackend,
};
pub use transport::{
    Transport, TransportDiagnostics, TransportEvents, TransportNotice, TransportSignal,
};
