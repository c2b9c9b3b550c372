#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage};
use parking_lot::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::time::Instant;

use live_view_client::application::services::{
    StreamSupervisor, SupervisorDeps, SupervisorSettings,
};
use live_view_client::application::transports::{
    PortTransportFactory, SurfaceArbiter, TransportContext, TransportPorts,
};
use live_view_client::domain::errors::{DomainError, Result};
use live_view_client::domain::ports::{
    AnswerResponse, Base64Snapshot, CameraStatus, ClientMessage, Frame, HlsStream,
    IceCandidatePayload, MediaPlayer, MediaSink, MediaSource, NoopReporter, OfferRequest,
    PeerConfig, PeerConnector, PeerEvent, PeerLink, PeerState, PlaybackSurfaces, PlayerEvent,
    PlayerFactory, RasterSink, SnapshotSocket, SnapshotSocketConnector, SocketEvent,
    StreamingBackend, TransportEvents, TransportNotice, TransportSignal,
};
use live_view_client::domain::value_objects::{
    BackendConfig, CameraId, SessionHandle, StreamMode, TransportTimings,
};

pub const CAMERA: u32 = 7;

pub fn camera() -> CameraId {
    CameraId::new(CAMERA)
}

pub fn backend_config() -> BackendConfig {
    BackendConfig::new("http://cams.test/api").unwrap()
}

/// Solid-colour JPEG; the size tells frames apart
pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([30, 120, 200]));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Jpeg).unwrap();
    out.into_inner()
}

pub fn events(generation: u64, mode: StreamMode) -> (TransportEvents, mpsc::UnboundedReceiver<TransportNotice>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (TransportEvents::new(generation, mode, tx), rx)
}

/// Everything signalled so far, in order
pub fn drain(rx: &mut mpsc::UnboundedReceiver<TransportNotice>) -> Vec<TransportSignal> {
    let mut signals = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        signals.push(notice.signal);
    }
    signals
}

/// Let spawned tasks run without moving the paused clock meaningfully
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ---------------------------------------------------------------------------
// Backend

#[derive(Default)]
pub struct BackendCalls {
    pub offers: Vec<(OfferRequest, Instant)>,
    pub relayed: Vec<(SessionHandle, IceCandidatePayload)>,
    pub deleted: Vec<SessionHandle>,
    pub hls_started: Vec<CameraId>,
    pub keepalives: Vec<SessionHandle>,
    pub stopped: Vec<SessionHandle>,
    pub snapshot_fetches: usize,
    pub status_checks: usize,
}

pub struct BackendScript {
    /// Fail the offer POST with this status
    pub offer_status: Option<u16>,
    pub offer_delay: Duration,
    pub answer_session: bool,
    pub answer_kind: String,
    pub keepalive_status: Option<u16>,
    pub snapshot_failing: bool,
    /// Per-fetch delays, consumed in call order
    pub snapshot_delays: VecDeque<Duration>,
    /// Per-fetch payloads, consumed in call order; a 4x3 JPEG once empty
    pub snapshot_frames: VecDeque<Vec<u8>>,
    pub camera_active: bool,
}

impl Default for BackendScript {
    fn default() -> Self {
        Self {
            offer_status: None,
            offer_delay: Duration::ZERO,
            answer_session: true,
            answer_kind: "answer".to_string(),
            keepalive_status: None,
            snapshot_failing: false,
            snapshot_delays: VecDeque::new(),
            snapshot_frames: VecDeque::new(),
            camera_active: true,
        }
    }
}

#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<BackendCalls>,
    script: Mutex<BackendScript>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self) -> MutexGuard<'_, BackendScript> {
        self.script.lock()
    }

    pub fn calls(&self) -> MutexGuard<'_, BackendCalls> {
        self.calls.lock()
    }

    pub fn offer_count(&self) -> usize {
        self.calls.lock().offers.len()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.calls.lock().deleted.iter().map(|h| h.to_string()).collect()
    }

    pub fn stopped(&self) -> Vec<String> {
        self.calls.lock().stopped.iter().map(|h| h.to_string()).collect()
    }

    fn status_error(endpoint: &str, status: u16) -> DomainError {
        DomainError::HttpStatus {
            endpoint: endpoint.to_string(),
            status,
        }
    }

    async fn next_snapshot(&self) -> Result<Vec<u8>> {
        let (delay, frame, failing) = {
            let mut script = self.script.lock();
            (
                script.snapshot_delays.pop_front().unwrap_or_default(),
                script.snapshot_frames.pop_front(),
                script.snapshot_failing,
            )
        };
        self.calls.lock().snapshot_fetches += 1;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(Self::status_error("/cameras/7/snapshot", 503));
        }
        Ok(frame.unwrap_or_else(|| jpeg(4, 3)))
    }
}

#[async_trait]
impl StreamingBackend for FakeBackend {
    async fn post_offer(&self, request: OfferRequest) -> Result<AnswerResponse> {
        let count = {
            let mut calls = self.calls.lock();
            calls.offers.push((request, Instant::now()));
            calls.offers.len()
        };
        let (delay, status, with_session, kind) = {
            let script = self.script.lock();
            (
                script.offer_delay,
                script.offer_status,
                script.answer_session,
                script.answer_kind.clone(),
            )
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(status) = status {
            return Err(Self::status_error("/webrtc/offer", status));
        }
        Ok(AnswerResponse {
            session_id: with_session.then(|| format!("rt-{}", count)),
            sdp: Some("v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\n".to_string()),
            kind: Some(kind),
        })
    }

    async fn relay_ice_candidate(
        &self,
        session: &SessionHandle,
        candidate: &IceCandidatePayload,
    ) -> Result<()> {
        self.calls
            .lock()
            .relayed
            .push((session.clone(), candidate.clone()));
        Ok(())
    }

    async fn delete_realtime_session(&self, session: &SessionHandle) -> Result<()> {
        self.calls.lock().deleted.push(session.clone());
        Ok(())
    }

    async fn start_hls(&self, camera_id: CameraId) -> Result<HlsStream> {
        let count = {
            let mut calls = self.calls.lock();
            calls.hls_started.push(camera_id);
            calls.hls_started.len()
        };
        Ok(HlsStream {
            url: format!("/static/hls/{}/index.m3u8", camera_id),
            session_id: format!("hls-{}", count),
            camera_id: Some(camera_id.get()),
            start_time: None,
        })
    }

    async fn hls_keepalive(&self, session: &SessionHandle) -> Result<()> {
        self.calls.lock().keepalives.push(session.clone());
        match self.script.lock().keepalive_status {
            Some(status) => Err(Self::status_error("/hls/keepalive", status)),
            None => Ok(()),
        }
    }

    async fn stop_hls(&self, session: &SessionHandle) -> Result<()> {
        self.calls.lock().stopped.push(session.clone());
        Ok(())
    }

    async fn hls_status(&self, session: &SessionHandle) -> Result<HlsStream> {
        Ok(HlsStream {
            url: format!("/static/hls/{}/index.m3u8", CAMERA),
            session_id: session.to_string(),
            camera_id: Some(CAMERA),
            start_time: Some(0.0),
        })
    }

    async fn fetch_snapshot(&self, _camera_id: CameraId) -> Result<Bytes> {
        self.next_snapshot().await.map(Bytes::from)
    }

    async fn fetch_snapshot_base64(&self, _camera_id: CameraId) -> Result<Base64Snapshot> {
        let raw = self.next_snapshot().await?;
        Ok(Base64Snapshot {
            data: format!("data:image/jpeg;base64,{}", STANDARD.encode(raw)),
            timestamp: Some(1.0),
        })
    }

    async fn camera_status(&self, camera_id: CameraId) -> Result<CameraStatus> {
        self.calls.lock().status_checks += 1;
        Ok(CameraStatus {
            camera_id: camera_id.get(),
            name: Some("Lobby".to_string()),
            active: self.script.lock().camera_active,
            fps: Some(15.0),
            current_occupancy: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Peer connection

#[derive(Debug, Clone, Default)]
pub struct PeerScript {
    pub connect_on_answer: bool,
    pub open_liveness: bool,
    pub echo_liveness: bool,
    pub candidates_before_answer: usize,
}

pub struct FakePeerLink {
    script: PeerScript,
    events: mpsc::UnboundedSender<PeerEvent>,
    pub sent: Mutex<Vec<String>>,
    pub answers: Mutex<Vec<String>>,
    pub closes: AtomicUsize,
    pub liveness_closed: AtomicBool,
}

pub fn candidate(index: usize) -> IceCandidatePayload {
    IceCandidatePayload {
        candidate: format!("candidate:{} 1 udp 2122260223 10.0.0.2 5000{} typ host", index, index),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
    }
}

impl FakePeerLink {
    pub fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerLink for FakePeerLink {
    async fn open_liveness_channel(&self) -> Result<()> {
        if self.script.open_liveness {
            self.emit(PeerEvent::LivenessOpen);
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<String> {
        for index in 0..self.script.candidates_before_answer {
            self.emit(PeerEvent::IceCandidate(candidate(index)));
        }
        Ok("v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\n".to_string())
    }

    async fn apply_answer(&self, sdp: String) -> Result<()> {
        self.answers.lock().push(sdp);
        if self.script.connect_on_answer {
            self.emit(PeerEvent::StateChanged(PeerState::Connecting));
            self.emit(PeerEvent::StateChanged(PeerState::Connected));
        }
        Ok(())
    }

    async fn send_liveness(&self, message: String) -> Result<()> {
        if self.script.echo_liveness {
            let ping: serde_json::Value = serde_json::from_str(&message).unwrap();
            let pong = serde_json::json!({ "type": "pong", "timestamp": ping["timestamp"] });
            self.emit(PeerEvent::LivenessMessage(pong.to_string()));
        }
        self.sent.lock().push(message);
        Ok(())
    }

    async fn close_liveness_channel(&self) {
        self.liveness_closed.store(true, Ordering::SeqCst);
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakePeerConnector {
    script: Mutex<PeerScript>,
    links: Mutex<Vec<Arc<FakePeerLink>>>,
}

impl FakePeerConnector {
    pub fn new(script: PeerScript) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            links: Mutex::new(Vec::new()),
        })
    }

    pub fn script(&self) -> MutexGuard<'_, PeerScript> {
        self.script.lock()
    }

    pub fn created(&self) -> usize {
        self.links.lock().len()
    }

    pub fn link(&self, index: usize) -> Arc<FakePeerLink> {
        self.links.lock()[index].clone()
    }
}

#[async_trait]
impl PeerConnector for FakePeerConnector {
    async fn create(
        &self,
        _config: PeerConfig,
    ) -> Result<(Arc<dyn PeerLink>, mpsc::UnboundedReceiver<PeerEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Arc::new(FakePeerLink {
            script: self.script.lock().clone(),
            events: tx,
            sent: Mutex::new(Vec::new()),
            answers: Mutex::new(Vec::new()),
            closes: AtomicUsize::new(0),
            liveness_closed: AtomicBool::new(false),
        });
        self.links.lock().push(link.clone());
        Ok((link, rx))
    }
}

// ---------------------------------------------------------------------------
// Playlist player

pub struct PlayerRecord {
    auto_play: bool,
    events: mpsc::UnboundedSender<PlayerEvent>,
    pub loads: Mutex<Vec<String>>,
    pub stops: AtomicUsize,
}

impl PlayerRecord {
    pub fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }

    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().clone()
    }
}

struct FakePlayer(Arc<PlayerRecord>);

impl MediaPlayer for FakePlayer {
    fn load(&self, url: &str) -> Result<()> {
        self.0.loads.lock().push(url.to_string());
        if self.0.auto_play {
            self.0.emit(PlayerEvent::Playing);
        }
        Ok(())
    }

    fn stop(&self) {
        self.0.stops.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakePlayerFactory {
    auto_play: AtomicBool,
    players: Mutex<Vec<Arc<PlayerRecord>>>,
}

impl FakePlayerFactory {
    pub fn new(auto_play: bool) -> Arc<Self> {
        Arc::new(Self {
            auto_play: AtomicBool::new(auto_play),
            players: Mutex::new(Vec::new()),
        })
    }

    pub fn set_auto_play(&self, auto_play: bool) {
        self.auto_play.store(auto_play, Ordering::SeqCst);
    }

    pub fn player(&self, index: usize) -> Arc<PlayerRecord> {
        self.players.lock()[index].clone()
    }

    pub fn created(&self) -> usize {
        self.players.lock().len()
    }
}

impl PlayerFactory for FakePlayerFactory {
    fn create(&self) -> Result<(Box<dyn MediaPlayer>, mpsc::UnboundedReceiver<PlayerEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let record = Arc::new(PlayerRecord {
            auto_play: self.auto_play.load(Ordering::SeqCst),
            events: tx,
            loads: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        });
        self.players.lock().push(record.clone());
        Ok((Box::new(FakePlayer(record)), rx))
    }
}

// ---------------------------------------------------------------------------
// Snapshot socket

/// The backend's end of one snapshot socket
pub struct ServerEnd {
    pub from_client: mpsc::UnboundedReceiver<ClientMessage>,
    pub to_client: mpsc::UnboundedSender<SocketEvent>,
    /// Set once the client's reader task is gone
    pub reader_stopped: Arc<AtomicBool>,
}

/// Flags its owner's task as stopped when dropped (including on abort)
struct StopFlag(Arc<AtomicBool>);

impl Drop for StopFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeSocketConnector {
    pub refuse: AtomicBool,
    servers: Mutex<VecDeque<ServerEnd>>,
}

impl FakeSocketConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take_server(&self) -> ServerEnd {
        self.servers
            .lock()
            .pop_front()
            .expect("a snapshot socket was opened")
    }
}

#[async_trait]
impl SnapshotSocketConnector for FakeSocketConnector {
    async fn open(&self, camera_id: CameraId) -> Result<SnapshotSocket> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(DomainError::TransportState(format!(
                "snapshot socket {} refused",
                camera_id
            )));
        }
        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        let reader_stopped = Arc::new(AtomicBool::new(false));
        let flag = StopFlag(reader_stopped.clone());
        let reader = tokio::spawn(async move {
            let _flag = flag;
            std::future::pending::<()>().await;
        });
        self.servers.lock().push_back(ServerEnd {
            from_client,
            to_client,
            reader_stopped,
        });
        Ok(SnapshotSocket {
            outbound,
            inbound,
            reader,
        })
    }
}

// ---------------------------------------------------------------------------
// Surfaces

#[derive(Default)]
pub struct RecordingMedia {
    pub attached: Mutex<Vec<String>>,
    pub detaches: AtomicUsize,
}

impl MediaSink for RecordingMedia {
    fn attach(&self, source: MediaSource) {
        let label = match source {
            MediaSource::Track(track) => format!("track:{}", track.id),
            MediaSource::Playlist { url } => url,
        };
        self.attached.lock().push(label);
    }

    fn detach(&self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct RecordingRaster {
    pub frames: Mutex<Vec<(u32, u32)>>,
    pub clears: AtomicUsize,
}

impl RasterSink for RecordingRaster {
    fn draw(&self, frame: Frame) {
        self.frames.lock().push((frame.width, frame.height));
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

impl RecordingRaster {
    pub fn frames(&self) -> Vec<(u32, u32)> {
        self.frames.lock().clone()
    }
}

// ---------------------------------------------------------------------------
// Wiring

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub peers: Arc<FakePeerConnector>,
    pub players: Arc<FakePlayerFactory>,
    pub sockets: Arc<FakeSocketConnector>,
    pub media: Arc<RecordingMedia>,
    pub raster: Arc<RecordingRaster>,
    pub timings: TransportTimings,
}

impl Harness {
    /// Backend answers, peers connect on answer and players start playing
    pub fn new() -> Self {
        Self {
            backend: FakeBackend::new(),
            peers: FakePeerConnector::new(PeerScript {
                connect_on_answer: true,
                ..Default::default()
            }),
            players: FakePlayerFactory::new(true),
            sockets: FakeSocketConnector::new(),
            media: Arc::new(RecordingMedia::default()),
            raster: Arc::new(RecordingRaster::default()),
            timings: TransportTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: TransportTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn context(&self) -> TransportContext {
        TransportContext {
            backend: self.backend.clone(),
            backend_config: backend_config(),
            surfaces: SurfaceArbiter::new(PlaybackSurfaces::new(
                self.media.clone(),
                self.raster.clone(),
            )),
            timings: self.timings.clone(),
            metrics: Arc::new(NoopReporter),
        }
    }

    pub fn factory(&self) -> PortTransportFactory {
        PortTransportFactory::new(
            self.context(),
            TransportPorts {
                peers: self.peers.clone(),
                players: self.players.clone(),
                sockets: self.sockets.clone(),
            },
        )
    }

    pub fn supervisor(&self, settings: SupervisorSettings) -> StreamSupervisor {
        StreamSupervisor::new(
            SupervisorDeps {
                factory: Arc::new(self.factory()),
                backend: self.backend.clone(),
                metrics: Arc::new(NoopReporter),
            },
            settings,
        )
    }
}
