pub mod gstreamer;
pub mod http;
pub mod metrics;
pub mod surfaces;
pub mod webrtc;
pub mod websocket;
