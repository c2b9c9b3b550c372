use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use image::{ImageFormat, ImageReader};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{abort_all, delayed_interval, epoch_millis, SurfaceLease, TransportContext};
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{
    ClientMessage, Frame, ServerMessage, SnapshotSocketConnector, SocketEvent, Transport,
    TransportDiagnostics, TransportEvents,
};
use crate::domain::value_objects::{CameraId, SnapshotFormat, SnapshotStrategy, StreamMode};

/// Validate a JPEG payload and wrap it as a frame
pub fn decode_frame(data: Bytes, captured_at: Option<f64>) -> Result<Frame> {
    let image = ImageReader::with_format(Cursor::new(&data[..]), ImageFormat::Jpeg)
        .decode()
        .map_err(|e| DomainError::Decode(e.to_string()))?;

    Ok(Frame {
        width: image.width(),
        height: image.height(),
        data,
        captured_at,
    })
}

/// Decode a base64 JPEG, with or without a `data:` URL prefix
pub fn decode_base64_frame(encoded: &str, captured_at: Option<f64>) -> Result<Frame> {
    let payload = match encoded.split_once(";base64,") {
        Some((_, rest)) => rest,
        None => encoded,
    };
    let raw = STANDARD
        .decode(payload.trim())
        .map_err(|e| DomainError::Decode(e.to_string()))?;
    decode_frame(Bytes::from(raw), captured_at)
}

/// [`decode_frame`] on the blocking pool
async fn decode_blocking(data: Bytes, captured_at: Option<f64>) -> Result<Frame> {
    tokio::task::spawn_blocking(move || decode_frame(data, captured_at))
        .await
        .map_err(|e| DomainError::Decode(e.to_string()))?
}

/// [`decode_base64_frame`] on the blocking pool
async fn decode_base64_blocking(encoded: String, captured_at: Option<f64>) -> Result<Frame> {
    tokio::task::spawn_blocking(move || decode_base64_frame(&encoded, captured_at))
        .await
        .map_err(|e| DomainError::Decode(e.to_string()))?
}

/// What started a poll-mode fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchTrigger {
    /// Scheduled tick; a fetch it supersedes counts as failed
    Tick,
    /// Out-of-band refresh
    Refresh,
}

#[derive(Default)]
struct SnapshotState {
    lease: Option<SurfaceLease>,
    tasks: Vec<JoinHandle<()>>,
    /// The single fetch allowed in flight; a new one aborts it
    in_flight: Option<JoinHandle<()>>,
    outbound: Option<mpsc::UnboundedSender<ClientMessage>>,
    binding: Option<(CameraId, TransportEvents)>,
    last_frame: Option<Frame>,
    first_frame_seen: bool,
    frames_rendered: u64,
    consecutive_failures: u32,
}

struct SnapshotCore {
    ctx: TransportContext,
    destroyed: AtomicBool,
    state: Mutex<SnapshotState>,
}

/// Still-image transport, polled over HTTP or pushed over a socket
pub struct SnapshotTransport {
    core: Arc<SnapshotCore>,
    sockets: Arc<dyn SnapshotSocketConnector>,
    started: AtomicBool,
}

impl SnapshotTransport {
    pub fn new(ctx: TransportContext, sockets: Arc<dyn SnapshotSocketConnector>) -> Self {
        Self {
            core: Arc::new(SnapshotCore {
                ctx,
                destroyed: AtomicBool::new(false),
                state: Mutex::new(SnapshotState::default()),
            }),
            sockets,
            started: AtomicBool::new(false),
        }
    }

    async fn start_push(&self, camera_id: CameraId, events: TransportEvents) -> Result<()> {
        let socket = self.sockets.open(camera_id).await?;
        tracing::info!(%camera_id, "Snapshot socket open");

        let pump = tokio::spawn(run_socket(self.core.clone(), socket.inbound, events));
        let pinger = tokio::spawn(run_socket_pings(self.core.clone()));

        let mut state = self.core.state.lock();
        if self.core.destroyed.load(Ordering::SeqCst) {
            abort_all(vec![pump, pinger, socket.reader]);
            return Err(DomainError::Destroyed);
        }
        state.outbound = Some(socket.outbound);
        state.tasks.extend([pump, pinger, socket.reader]);
        Ok(())
    }

    fn start_poll(&self) -> Result<()> {
        let ticker = tokio::spawn(run_poll(self.core.clone()));

        let mut state = self.core.state.lock();
        if self.core.destroyed.load(Ordering::SeqCst) {
            ticker.abort();
            return Err(DomainError::Destroyed);
        }
        state.tasks.push(ticker);
        Ok(())
    }
}

impl SnapshotCore {
    fn binding(&self) -> Option<(CameraId, TransportEvents)> {
        self.state.lock().binding.clone()
    }

    /// Start a fetch, aborting whichever one is still running
    fn spawn_fetch(self: &Arc<Self>, trigger: FetchTrigger) {
        let Some((camera_id, events)) = self.binding() else {
            return;
        };
        let core = self.clone();
        let fetch_events = events.clone();

        let stalled = {
            let mut state = self.state.lock();
            if self.destroyed.load(Ordering::SeqCst) {
                return;
            }
            let stalled = match state.in_flight.take() {
                Some(previous) => {
                    let unfinished = !previous.is_finished();
                    previous.abort();
                    unfinished
                }
                None => false,
            };
            state.in_flight = Some(tokio::spawn(async move {
                core.fetch_and_render(camera_id, &fetch_events).await;
            }));
            stalled
        };

        if !stalled {
            return;
        }
        match trigger {
            FetchTrigger::Tick => {
                let interval = self.ctx.timings.snapshot_interval();
                self.record_fetch_failure(
                    camera_id,
                    DomainError::TransportState(format!(
                        "snapshot fetch still pending after {}ms",
                        interval.as_millis()
                    )),
                    &events,
                );
            }
            FetchTrigger::Refresh => {
                tracing::debug!(%camera_id, "Superseding in-flight snapshot fetch");
            }
        }
    }

    async fn fetch_and_render(&self, camera_id: CameraId, events: &TransportEvents) {
        let backend = &self.ctx.backend;
        let frame = match self.ctx.timings.snapshot_format() {
            SnapshotFormat::Binary => match backend.fetch_snapshot(camera_id).await {
                Ok(data) => Ok(decode_blocking(data, None).await),
                Err(e) => Err(e),
            },
            SnapshotFormat::Base64 => match backend.fetch_snapshot_base64(camera_id).await {
                Ok(snapshot) => Ok(decode_base64_blocking(snapshot.data, snapshot.timestamp).await),
                Err(e) => Err(e),
            },
        };

        match frame {
            Err(e) => self.record_fetch_failure(camera_id, e, events),
            Ok(decoded) => {
                self.state.lock().consecutive_failures = 0;
                match decoded {
                    Ok(frame) => self.render(frame, events),
                    Err(e) => tracing::debug!(%camera_id, "Discarding snapshot: {}", e),
                }
            }
        }
    }

    fn record_fetch_failure(&self, camera_id: CameraId, error: DomainError, events: &TransportEvents) {
        let max = self.ctx.timings.snapshot_max_fetch_failures();
        let failures = {
            let mut state = self.state.lock();
            state.consecutive_failures += 1;
            state.consecutive_failures
        };
        tracing::warn!(%camera_id, failures, "Snapshot fetch failed: {}", error);

        if failures == max {
            events.on_error(DomainError::TransportState(format!(
                "{} consecutive snapshot fetches failed: {}",
                failures, error
            )));
        }
    }

    fn render(&self, frame: Frame, events: &TransportEvents) {
        let first = {
            let mut state = self.state.lock();
            if self.destroyed.load(Ordering::SeqCst) {
                return;
            }
            let drawn = state
                .lease
                .as_ref()
                .map(|lease| lease.draw(frame.clone()))
                .unwrap_or(false);
            if !drawn {
                return;
            }
            state.last_frame = Some(frame);
            state.frames_rendered += 1;
            !std::mem::replace(&mut state.first_frame_seen, true)
        };

        self.ctx.metrics.report_frame_rendered();
        if first {
            tracing::info!("First snapshot frame rendered");
            events.on_connected();
        }
    }

    fn send(&self, message: ClientMessage) {
        let state = self.state.lock();
        if let Some(outbound) = state.outbound.as_ref() {
            if outbound.send(message).is_err() {
                tracing::debug!("Snapshot socket already closed");
            }
        }
    }
}

async fn run_poll(core: Arc<SnapshotCore>) {
    let mut ticker = tokio::time::interval(core.ctx.timings.snapshot_interval());
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        core.spawn_fetch(FetchTrigger::Tick);
    }
}

async fn run_socket_pings(core: Arc<SnapshotCore>) {
    let mut ticker = delayed_interval(core.ctx.timings.snapshot_ping_interval());
    loop {
        ticker.tick().await;
        core.send(ClientMessage::Ping {
            timestamp: epoch_millis(),
        });
    }
}

async fn run_socket(
    core: Arc<SnapshotCore>,
    mut inbound: mpsc::UnboundedReceiver<SocketEvent>,
    events: TransportEvents,
) {
    while let Some(event) = inbound.recv().await {
        match event {
            SocketEvent::Message(ServerMessage::Snapshot { data, timestamp }) => {
                match decode_base64_blocking(data, timestamp).await {
                    Ok(frame) => core.render(frame, &events),
                    Err(e) => tracing::debug!("Discarding pushed snapshot: {}", e),
                }
            }
            SocketEvent::Message(ServerMessage::Ping { .. }) => core.send(ClientMessage::Pong {
                timestamp: epoch_millis(),
            }),
            SocketEvent::Message(ServerMessage::Pong { .. }) => {
                tracing::trace!("Snapshot socket pong");
            }
            SocketEvent::Message(ServerMessage::Info { message }) => {
                tracing::info!(message = message.as_deref().unwrap_or(""), "Snapshot socket info");
            }
            SocketEvent::Malformed(text) => {
                tracing::debug!(len = text.len(), "Ignoring unrecognised snapshot message");
            }
            SocketEvent::Closed { abnormal, reason } => {
                if abnormal {
                    tracing::warn!("Snapshot socket closed abnormally: {}", reason);
                } else {
                    tracing::info!("Snapshot socket closed by backend: {}", reason);
                }
                events.on_error(DomainError::TransportState(format!(
                    "snapshot socket closed: {}",
                    reason
                )));
                return;
            }
        }
    }
    events.on_error(DomainError::TransportState(
        "snapshot socket ended".to_string(),
    ));
}

#[async_trait]
impl Transport for SnapshotTransport {
    fn mode(&self) -> StreamMode {
        StreamMode::Snapshot
    }

    async fn connect(&self, camera_id: CameraId, events: TransportEvents) -> Result<()> {
        if self.core.destroyed.load(Ordering::SeqCst) {
            return Err(DomainError::Destroyed);
        }
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(DomainError::ConnectInFlight);
        }

        {
            let mut state = self.core.state.lock();
            state.lease = Some(self.core.ctx.surfaces.lease(events.generation()));
            state.binding = Some((camera_id, events.clone()));
        }

        match self.core.ctx.timings.snapshot_strategy() {
            SnapshotStrategy::Poll => self.start_poll(),
            SnapshotStrategy::Push => self.start_push(camera_id, events).await,
        }
    }

    async fn refresh(&self) -> Result<()> {
        if self.core.destroyed.load(Ordering::SeqCst) {
            return Err(DomainError::Destroyed);
        }
        match self.core.ctx.timings.snapshot_strategy() {
            SnapshotStrategy::Poll => self.core.spawn_fetch(FetchTrigger::Refresh),
            SnapshotStrategy::Push => self.core.send(ClientMessage::Ping {
                timestamp: epoch_millis(),
            }),
        }
        Ok(())
    }

    async fn cleanup(&self) {
        if self.core.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let (tasks, in_flight, outbound, lease) = {
            let mut state = self.core.state.lock();
            state.last_frame = None;
            state.binding = None;
            (
                std::mem::take(&mut state.tasks),
                state.in_flight.take(),
                state.outbound.take(),
                state.lease.take(),
            )
        };

        abort_all(tasks);
        if let Some(fetch) = in_flight {
            fetch.abort();
        }
        drop(outbound);
        if let Some(lease) = lease {
            lease.clear();
        }
        tracing::debug!("Snapshot transport torn down");
    }

    fn diagnostics(&self) -> TransportDiagnostics {
        let state = self.core.state.lock();
        TransportDiagnostics {
            mode: StreamMode::Snapshot,
            frames_rendered: Some(state.frames_rendered),
            consecutive_failures: Some(state.consecutive_failures),
            destroyed: self.core.destroyed.load(Ordering::SeqCst),
            ..Default::default()
        }
    }
}
