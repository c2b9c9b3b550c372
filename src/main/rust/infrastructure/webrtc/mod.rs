mod peer_link;

pub use peer_link::{WebRtcPeerConnector, WebRtcPeerLink};
