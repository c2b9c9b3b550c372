pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-exports for convenience
pub use application::services::{
    ConnectRequest, StreamSupervisor, SupervisorDeps, SupervisorSettings, SupervisorStatus,
};
pub use application::transports::{
    PortTransportFactory, SurfaceArbiter, TransportContext, TransportFactory, TransportPorts,
};
pub use config::Config;
pub use domain::errors::{DomainError, ErrorClass, Result};
pub use domain::ports::{MetricsReporter, PlaybackSurfaces, StreamingBackend, Transport};
pub use domain::value_objects::{
    BackendConfig, BackoffPolicy, CameraId, ConnectionState, LifecycleState, StreamMode,
    TransportTimings,
};
pub use infrastructure::gstreamer::{PipelineBuilder, PlaybinPlayerFactory};
pub use infrastructure::http::HttpStreamingBackend;
pub use infrastructure::metrics::{serve_metrics, PrometheusReporter};
pub use infrastructure::surfaces::{FrameFileSink, TrackStatsSink};
pub use infrastructure::webrtc::WebRtcPeerConnector;
pub use infrastructure::websocket::TungsteniteSnapshotConnector;
