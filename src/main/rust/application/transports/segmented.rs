use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{abort_all, delayed_interval, SurfaceLease, TransportContext};
use crate::domain::entities::SessionSlot;
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{
    HlsStream, MediaPlayer, MediaSource, PlayerEvent, PlayerFactory, StreamingBackend, Transport,
    TransportDiagnostics, TransportEvents,
};
use crate::domain::value_objects::{CameraId, SessionHandle, StreamMode};

#[derive(Default)]
struct SegmentedState {
    player: Option<Arc<dyn MediaPlayer>>,
    lease: Option<SurfaceLease>,
    tasks: Vec<JoinHandle<()>>,
    playlist_url: Option<String>,
    reloads: u32,
    keepalive: Option<String>,
}

/// Backend-assembled HLS stream played through a [`MediaPlayer`]
pub struct SegmentedTransport {
    ctx: TransportContext,
    players: Arc<dyn PlayerFactory>,
    session: Arc<SessionSlot>,
    started: AtomicBool,
    destroyed: Arc<AtomicBool>,
    state: Arc<Mutex<SegmentedState>>,
}

/// Append a fresh `_t` query token so every (re)load bypasses caches
pub fn with_cache_token(url: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}_t={}", url, separator, Uuid::new_v4())
}

impl SegmentedTransport {
    pub fn new(ctx: TransportContext, players: Arc<dyn PlayerFactory>) -> Self {
        Self {
            ctx,
            players,
            session: Arc::new(SessionSlot::new()),
            started: AtomicBool::new(false),
            destroyed: Arc::new(AtomicBool::new(false)),
            state: Arc::new(Mutex::new(SegmentedState::default())),
        }
    }

    /// Backend view of the current session, if one was started
    pub async fn status(&self) -> Result<Option<HlsStream>> {
        match self.session.current() {
            Some(handle) => self.ctx.backend.hls_status(&handle).await.map(Some),
            None => Ok(None),
        }
    }

    async fn start(&self, camera_id: CameraId, events: TransportEvents) -> Result<()> {
        let lease = self.ctx.surfaces.lease(events.generation());
        let stream = self
            .ctx
            .backend
            .start_hls(camera_id)
            .await
            .map_err(DomainError::into_negotiation)?;

        let handle = SessionHandle::new(stream.session_id.clone());
        if let Some(orphan) = self.session.record(handle.clone()) {
            tracing::info!(%camera_id, session_id = %orphan, "Stream started after teardown, stopping it");
            self.ctx.spawn_release(StreamMode::SegmentedHttp, orphan);
            return Err(DomainError::Destroyed);
        }
        tracing::info!(%camera_id, session_id = %handle, "Segmented session started");

        let (player, player_events) = self.players.create()?;
        let player: Arc<dyn MediaPlayer> = Arc::from(player);
        let playlist = self.ctx.backend_config.resolve(&stream.url);
        let url = with_cache_token(&playlist);

        let accepted = {
            let mut state = self.state.lock();
            if self.destroyed.load(Ordering::SeqCst) {
                false
            } else {
                lease.attach(MediaSource::Playlist { url: url.clone() });
                state.player = Some(player.clone());
                state.lease = Some(lease);
                state.playlist_url = Some(playlist);
                true
            }
        };
        if !accepted {
            player.stop();
            return Err(DomainError::Destroyed);
        }

        player.load(&url)?;

        let pump = PlayerPump {
            events: events.clone(),
            state: self.state.clone(),
            max_reloads: self.ctx.timings.player_max_reloads(),
        };
        let keepalive = tokio::spawn(run_keepalive(
            self.ctx.backend.clone(),
            handle,
            self.state.clone(),
            events,
            self.ctx.timings.keepalive_interval(),
            self.ctx.timings.escalate_expired_keepalive(),
        ));
        let pump = tokio::spawn(pump.run(player_events));

        let mut state = self.state.lock();
        if self.destroyed.load(Ordering::SeqCst) {
            keepalive.abort();
            pump.abort();
        } else {
            state.tasks.push(keepalive);
            state.tasks.push(pump);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for SegmentedTransport {
    fn mode(&self) -> StreamMode {
        StreamMode::SegmentedHttp
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
        self.start(camera_id, events).await
    }

    async fn cleanup(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let (tasks, player, lease) = {
            let mut state = self.state.lock();
            (
                std::mem::take(&mut state.tasks),
                state.player.take(),
                state.lease.take(),
            )
        };

        abort_all(tasks);
        if let Some(player) = player {
            player.stop();
        }
        if let Some(lease) = lease {
            lease.detach();
        }
        if let Some(handle) = self.session.take_for_release() {
            self.ctx.spawn_release(StreamMode::SegmentedHttp, handle);
        }
        tracing::debug!("Segmented transport torn down");
    }

    fn diagnostics(&self) -> TransportDiagnostics {
        let state = self.state.lock();
        TransportDiagnostics {
            mode: StreamMode::SegmentedHttp,
            session_id: self.session.current().map(|h| h.to_string()),
            player_reloads: Some(state.reloads),
            keepalive: state.keepalive.clone(),
            destroyed: self.destroyed.load(Ordering::SeqCst),
            ..Default::default()
        }
    }
}

struct PlayerPump {
    events: TransportEvents,
    state: Arc<Mutex<SegmentedState>>,
    max_reloads: u32,
}

impl PlayerPump {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<PlayerEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                PlayerEvent::Playing => {
                    self.state.lock().reloads = 0;
                    self.events.on_connected();
                }
                PlayerEvent::Error(reason) => self.on_failure(reason),
                PlayerEvent::Ended => self.on_failure("playlist ended".to_string()),
            }
        }
    }

    fn on_failure(&self, reason: String) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let (Some(player), Some(playlist)) = (state.player.clone(), state.playlist_url.clone())
        else {
            return;
        };

        if state.reloads >= self.max_reloads {
            tracing::warn!(reloads = state.reloads, "Player failed after all reloads: {}", reason);
            self.events.on_error(DomainError::Player(format!(
                "{} (after {} reloads)",
                reason, state.reloads
            )));
            return;
        }

        state.reloads += 1;
        let url = with_cache_token(&playlist);
        tracing::warn!(
            attempt = state.reloads,
            max = self.max_reloads,
            "Player error, reloading: {}",
            reason
        );
        if let Some(lease) = state.lease.as_ref() {
            lease.attach(MediaSource::Playlist { url: url.clone() });
        }
        if let Err(e) = player.load(&url) {
            self.events.on_error(e);
        }
    }
}

async fn run_keepalive(
    backend: Arc<dyn StreamingBackend>,
    session: SessionHandle,
    state: Arc<Mutex<SegmentedState>>,
    events: TransportEvents,
    interval: Duration,
    escalate_expired: bool,
) {
    let mut ticker = delayed_interval(interval);
    loop {
        ticker.tick().await;

        match backend.hls_keepalive(&session).await {
            Ok(()) => {
                tracing::debug!(session_id = %session, "Keep-alive sent");
                state.lock().keepalive = Some("ok".to_string());
            }
            Err(e) if escalate_expired && e.is_not_found() => {
                tracing::warn!(session_id = %session, "Segmented session expired on the backend");
                state.lock().keepalive = Some("expired".to_string());
                events.on_error(DomainError::TransportState(format!(
                    "segmented session {} expired",
                    session
                )));
                return;
            }
            Err(e) => {
                let err = DomainError::KeepAlive(e.to_string());
                tracing::warn!(session_id = %session, "{}", err);
                state.lock().keepalive = Some(err.to_string());
            }
        }
    }
}
