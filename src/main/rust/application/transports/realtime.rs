use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{abort_all, delayed_interval, epoch_millis, SurfaceLease, TransportContext};
use crate::domain::entities::SessionSlot;
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{
    IceCandidatePayload, MediaSource, OfferRequest, PeerConfig, PeerConnector, PeerEvent,
    PeerLink, PeerState, Transport, TransportDiagnostics, TransportEvents,
};
use crate::domain::value_objects::{CameraId, SessionHandle, StreamMode};

#[derive(Debug, Default)]
struct Liveness {
    open: bool,
    silent: bool,
    last_seen: Option<Instant>,
    last_rtt_ms: Option<u64>,
}

impl Liveness {
    fn describe(&self) -> &'static str {
        match (self.open, self.silent) {
            (true, true) => "silent",
            (true, false) => "open",
            (false, _) if self.last_seen.is_some() => "closed",
            (false, _) => "unopened",
        }
    }
}

#[derive(Default)]
struct RealtimeState {
    peer: Option<Arc<dyn PeerLink>>,
    lease: Option<SurfaceLease>,
    tasks: Vec<JoinHandle<()>>,
    /// Relay target, known once the answer has been applied
    relay_session: Option<SessionHandle>,
    pending_candidates: Vec<IceCandidatePayload>,
    peer_state: Option<PeerState>,
    liveness: Liveness,
}

/// Low-latency peer media transport.
///
/// An instance negotiates once. A second `connect` is rejected whether or not
/// the first one is still running, and nothing is reusable after `cleanup`.
pub struct RealtimeTransport {
    ctx: TransportContext,
    connector: Arc<dyn PeerConnector>,
    session: Arc<SessionSlot>,
    started: AtomicBool,
    destroyed: Arc<AtomicBool>,
    state: Arc<Mutex<RealtimeState>>,
}

impl RealtimeTransport {
    pub fn new(ctx: TransportContext, connector: Arc<dyn PeerConnector>) -> Self {
        Self {
            ctx,
            connector,
            session: Arc::new(SessionSlot::new()),
            started: AtomicBool::new(false),
            destroyed: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(RealtimeState::default())),
        }
    }

    fn track_task(&self, task: JoinHandle<()>) {
        let mut state = self.state.lock();
        if self.destroyed.load(Ordering::SeqCst) {
            task.abort();
        } else {
            state.tasks.push(task);
        }
    }

    async fn negotiate(&self, camera_id: CameraId, events: TransportEvents) -> Result<()> {
        let lease = self.ctx.surfaces.lease(events.generation());
        let config = PeerConfig {
            stun_servers: self.ctx.timings.stun_servers().to_vec(),
        };
        let (peer, peer_events) = self
            .connector
            .create(config)
            .await
            .map_err(DomainError::into_negotiation)?;

        let accepted = {
            let mut state = self.state.lock();
            if self.destroyed.load(Ordering::SeqCst) {
                false
            } else {
                state.peer = Some(peer.clone());
                state.lease = Some(lease);
                true
            }
        };
        if !accepted {
            peer.close().await;
            return Err(DomainError::Destroyed);
        }

        let pump = PeerPump {
            ctx: self.ctx.clone(),
            peer: peer.clone(),
            events: events.clone(),
            state: self.state.clone(),
            destroyed: self.destroyed.clone(),
        };
        self.track_task(tokio::spawn(pump.run(peer_events)));

        if let Err(e) = peer.open_liveness_channel().await {
            tracing::warn!(%camera_id, "Liveness channel unavailable: {}", e);
        }

        let offer = peer
            .create_offer()
            .await
            .map_err(DomainError::into_negotiation)?;
        tracing::debug!(%camera_id, "Posting realtime offer");
        let answer = self
            .ctx
            .backend
            .post_offer(OfferRequest::new(camera_id, offer))
            .await
            .map_err(DomainError::into_negotiation)?;

        let handle = answer
            .session_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(SessionHandle::new);
        if let Some(handle) = handle.clone() {
            if let Some(orphan) = self.session.record(handle) {
                tracing::info!(
                    %camera_id,
                    session_id = %orphan,
                    "Offer answered after teardown, releasing session"
                );
                self.ctx.spawn_release(StreamMode::Realtime, orphan);
                return Err(DomainError::Destroyed);
            }
        }
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(DomainError::Destroyed);
        }

        let sdp = answer
            .sdp
            .filter(|sdp| !sdp.trim().is_empty())
            .ok_or_else(|| DomainError::Negotiation("answer carried no SDP".to_string()))?;
        if let Some(kind) = answer.kind.as_deref() {
            if kind != "answer" {
                return Err(DomainError::Negotiation(format!(
                    "unexpected description type '{}'",
                    kind
                )));
            }
        }
        peer.apply_answer(sdp)
            .await
            .map_err(DomainError::into_negotiation)?;

        let pending = {
            let mut state = self.state.lock();
            state.relay_session = handle.clone();
            std::mem::take(&mut state.pending_candidates)
        };
        match handle {
            Some(handle) => {
                tracing::info!(%camera_id, session_id = %handle, "Realtime session negotiated");
                for candidate in pending {
                    spawn_relay(&self.ctx, handle.clone(), candidate);
                }
            }
            None => {
                tracing::warn!(
                    %camera_id,
                    dropped = pending.len(),
                    "Answer had no session id, candidates will not be relayed"
                );
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for RealtimeTransport {
    fn mode(&self) -> StreamMode {
        StreamMode::Realtime
    }

    async fn connect(&self, camera_id: CameraId, events: TransportEvents) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(DomainError::Destroyed);
        }
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DomainError::ConnectInFlight);
        }
        self.negotiate(camera_id, events).await
    }

    async fn cleanup(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let (tasks, peer, lease) = {
            let mut state = self.state.lock();
            state.liveness.open = false;
            state.pending_candidates.clear();
            (
                std::mem::take(&mut state.tasks),
                state.peer.take(),
                state.lease.take(),
            )
        };

        abort_all(tasks);
        if let Some(peer) = peer {
            peer.close_liveness_channel().await;
            peer.close().await;
        }
        if let Some(lease) = lease {
            lease.detach();
        }
        if let Some(handle) = self.session.take_for_release() {
            self.ctx.spawn_release(StreamMode::Realtime, handle);
        }
        tracing::debug!("Realtime transport torn down");
    }

    fn diagnostics(&self) -> TransportDiagnostics {
        let state = self.state.lock();
        TransportDiagnostics {
            mode: StreamMode::Realtime,
            session_id: self.session.current().map(|h| h.to_string()),
            peer_state: state.peer_state.map(|s| s.to_string()),
            liveness: Some(state.liveness.describe().to_string()),
            liveness_rtt_ms: state.liveness.last_rtt_ms,
            destroyed: self.destroyed.load(Ordering::SeqCst),
            ..Default::default()
        }
    }
}

fn spawn_relay(ctx: &TransportContext, session: SessionHandle, candidate: IceCandidatePayload) {
    let backend = ctx.backend.clone();
    tokio::spawn(async move {
        if let Err(e) = backend.relay_ice_candidate(&session, &candidate).await {
            let err = DomainError::Relay(e.to_string());
            tracing::warn!(session_id = %session, "{}", err);
        } else {
            tracing::debug!(session_id = %session, "Candidate relayed");
        }
    });
}

/// Drains peer events for one negotiation
struct PeerPump {
    ctx: TransportContext,
    peer: Arc<dyn PeerLink>,
    events: TransportEvents,
    state: Arc<Mutex<RealtimeState>>,
    destroyed: Arc<AtomicBool>,
}

impl PeerPump {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<PeerEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                PeerEvent::IceCandidate(candidate) => self.relay(candidate),
                PeerEvent::Track(track) => {
                    tracing::info!(track_id = %track.id, mime = %track.mime_type, "Remote track received");
                    let state = self.state.lock();
                    match state.lease.as_ref() {
                        Some(lease) => {
                            lease.attach(MediaSource::Track(track));
                        }
                        None => tracing::debug!("Track arrived without a surface lease"),
                    }
                }
                PeerEvent::StateChanged(peer_state) => self.on_peer_state(peer_state),
                PeerEvent::LivenessOpen => self.start_liveness(),
                PeerEvent::LivenessMessage(message) => self.record_liveness(&message),
                PeerEvent::LivenessClosed => {
                    self.state.lock().liveness.open = false;
                    tracing::debug!("Liveness channel closed");
                }
            }
        }
    }

    fn relay(&self, candidate: IceCandidatePayload) {
        let target = {
            let mut state = self.state.lock();
            match state.relay_session.clone() {
                Some(session) => session,
                None => {
                    state.pending_candidates.push(candidate);
                    return;
                }
            }
        };
        spawn_relay(&self.ctx, target, candidate);
    }

    fn on_peer_state(&self, peer_state: PeerState) {
        self.state.lock().peer_state = Some(peer_state);
        tracing::debug!(%peer_state, "Peer connection state changed");

        match peer_state {
            PeerState::Connected => self.events.on_connected(),
            s if s.is_terminal() => self
                .events
                .on_error(DomainError::TransportState(format!("peer connection {}", s))),
            _ => {}
        }
    }

    fn start_liveness(&self) {
        let interval = self.ctx.timings.liveness_interval();
        let timeout = self.ctx.timings.liveness_timeout();

        let mut state = self.state.lock();
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        state.liveness.open = true;
        state.liveness.silent = false;
        state.liveness.last_seen = Some(Instant::now());

        let task = tokio::spawn(run_liveness(
            self.peer.clone(),
            self.state.clone(),
            self.events.clone(),
            interval,
            timeout,
        ));
        state.tasks.push(task);
        tracing::debug!("Liveness channel open");
    }

    fn record_liveness(&self, message: &str) {
        let mut state = self.state.lock();
        state.liveness.last_seen = Some(Instant::now());
        state.liveness.silent = false;

        let Ok(value) = serde_json::from_str::<serde_json::Value>(message) else {
            return;
        };
        if value.get("type").and_then(|t| t.as_str()) == Some("pong") {
            if let Some(sent) = value.get("timestamp").and_then(|t| t.as_u64()) {
                state.liveness.last_rtt_ms = Some(epoch_millis().saturating_sub(sent));
            }
        }
    }
}

async fn run_liveness(
    peer: Arc<dyn PeerLink>,
    state: Arc<Mutex<RealtimeState>>,
    events: TransportEvents,
    interval: Duration,
    timeout: Duration,
) {
    let mut ticker = delayed_interval(interval);
    loop {
        ticker.tick().await;

        let ping = serde_json::json!({ "type": "ping", "timestamp": epoch_millis() }).to_string();
        if let Err(e) = peer.send_liveness(ping).await {
            tracing::debug!("Liveness ping not sent: {}", e);
        }

        let went_silent = {
            let mut state = state.lock();
            let quiet = state
                .liveness
                .last_seen
                .map(|seen| seen.elapsed() >= timeout)
                .unwrap_or(true);
            if quiet && !state.liveness.silent {
                state.liveness.silent = true;
                true
            } else {
                false
            }
        };
        if went_silent {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Liveness channel silent");
            events.on_degraded("liveness channel silent");
        }
    }
}
