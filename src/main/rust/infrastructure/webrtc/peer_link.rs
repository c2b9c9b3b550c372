use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::RTCIceCandidate;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::{RTCRtpTransceiver, RTCRtpTransceiverInit};
use webrtc::track::track_remote::TrackRemote;

use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{
    IceCandidatePayload, PeerConfig, PeerConnector, PeerEvent, PeerLink, PeerState, RemoteTrack,
    LIVENESS_CHANNEL_LABEL,
};

fn negotiation(step: &str) -> impl Fn(webrtc::Error) -> DomainError + '_ {
    move |e| DomainError::Negotiation(format!("{}: {}", step, e))
}

/// Builds receive-only peer connections with the webrtc-rs stack
#[derive(Debug, Default, Clone, Copy)]
pub struct WebRtcPeerConnector;

impl WebRtcPeerConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerConnector for WebRtcPeerConnector {
    async fn create(
        &self,
        config: PeerConfig,
    ) -> Result<(Arc<dyn PeerLink>, mpsc::UnboundedReceiver<PeerEvent>)> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(negotiation("register codecs"))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(negotiation("register interceptors"))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .stun_servers
                .iter()
                .map(|url| RTCIceServer {
                    urls: vec![url.clone()],
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let pc = api
            .new_peer_connection(rtc_config)
            .await
            .map_err(negotiation("create peer connection"))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let link = WebRtcPeerLink {
            pc: Arc::new(pc),
            events: events_tx,
            data_channel: Mutex::new(None),
            readers: Arc::new(Mutex::new(Vec::new())),
        };
        link.install_handlers();
        tracing::debug!(stun = ?config.stun_servers, "Peer connection created");

        Ok((Arc::new(link), events_rx))
    }
}

pub struct WebRtcPeerLink {
    pc: Arc<RTCPeerConnection>,
    events: mpsc::UnboundedSender<PeerEvent>,
    data_channel: Mutex<Option<Arc<RTCDataChannel>>>,
    readers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl WebRtcPeerLink {
    fn install_handlers(&self) {
        let events = self.events.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                if let Some(candidate) = candidate {
                    match candidate.to_json() {
                        Ok(init) => {
                            let _ = events.send(PeerEvent::IceCandidate(IceCandidatePayload {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                            }));
                        }
                        Err(e) => tracing::debug!("Unserialisable ICE candidate: {}", e),
                    }
                }
                Box::pin(async {})
            }));

        let events = self.events.clone();
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                let mapped = match state {
                    RTCPeerConnectionState::New => Some(PeerState::New),
                    RTCPeerConnectionState::Connecting => Some(PeerState::Connecting),
                    RTCPeerConnectionState::Connected => Some(PeerState::Connected),
                    RTCPeerConnectionState::Disconnected => Some(PeerState::Disconnected),
                    RTCPeerConnectionState::Failed => Some(PeerState::Failed),
                    RTCPeerConnectionState::Closed => Some(PeerState::Closed),
                    _ => None,
                };
                if let Some(state) = mapped {
                    let _ = events.send(PeerEvent::StateChanged(state));
                }
                Box::pin(async {})
            }));

        let events = self.events.clone();
        let readers = self.readers.clone();
        self.pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let (packets_tx, packets_rx) = mpsc::unbounded_channel();
                let remote = RemoteTrack {
                    id: track.id(),
                    stream_id: track.stream_id(),
                    mime_type: track.codec().capability.mime_type,
                    packets: packets_rx,
                };
                let _ = events.send(PeerEvent::Track(remote));
                readers.lock().push(tokio::spawn(read_track(track, packets_tx)));
                Box::pin(async {})
            },
        ));
    }
}

/// Forward RTP payloads until the track ends or nobody listens
async fn read_track(track: Arc<TrackRemote>, packets: mpsc::UnboundedSender<bytes::Bytes>) {
    loop {
        match track.read_rtp().await {
            Ok((packet, _attributes)) => {
                if packet.payload.is_empty() {
                    continue;
                }
                if packets.send(packet.payload).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(track_id = %track.id(), "Track reader stopped: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl PeerLink for WebRtcPeerLink {
    async fn open_liveness_channel(&self) -> Result<()> {
        let channel = self
            .pc
            .create_data_channel(LIVENESS_CHANNEL_LABEL, None)
            .await
            .map_err(|e| DomainError::TransportState(format!("liveness channel: {}", e)))?;

        let events = self.events.clone();
        channel.on_open(Box::new(move || {
            let _ = events.send(PeerEvent::LivenessOpen);
            Box::pin(async {})
        }));

        let events = self.events.clone();
        channel.on_message(Box::new(move |message: DataChannelMessage| {
            let text = String::from_utf8_lossy(&message.data).into_owned();
            let _ = events.send(PeerEvent::LivenessMessage(text));
            Box::pin(async {})
        }));

        let events = self.events.clone();
        channel.on_close(Box::new(move || {
            let _ = events.send(PeerEvent::LivenessClosed);
            Box::pin(async {})
        }));

        *self.data_channel.lock() = Some(channel);
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        self.pc
            .add_transceiver_from_kind(
                RTPCodecType::Video,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(negotiation("add video transceiver"))?;

        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(negotiation("create offer"))?;
        let sdp = offer.sdp.clone();
        self.pc
            .set_local_description(offer)
            .await
            .map_err(negotiation("set local description"))?;
        Ok(sdp)
    }

    async fn apply_answer(&self, sdp: String) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp).map_err(negotiation("parse answer"))?;
        self.pc
            .set_remote_description(answer)
            .await
            .map_err(negotiation("set remote description"))
    }

    async fn send_liveness(&self, message: String) -> Result<()> {
        let channel = self.data_channel.lock().clone();
        let Some(channel) = channel else {
            return Err(DomainError::TransportState("liveness channel not open".to_string()));
        };
        channel
            .send_text(message)
            .await
            .map(|_| ())
            .map_err(|e| DomainError::TransportState(format!("liveness send: {}", e)))
    }

    async fn close_liveness_channel(&self) {
        let channel = self.data_channel.lock().take();
        if let Some(channel) = channel {
            if let Err(e) = channel.close().await {
                tracing::debug!("Closing liveness channel: {}", e);
            }
        }
    }

    async fn close(&self) {
        if let Err(e) = self.pc.close().await {
            tracing::debug!("Closing peer connection: {}", e);
        }
        let readers = std::mem::take(&mut *self.readers.lock());
        for reader in readers {
            reader.abort();
        }
    }
}
