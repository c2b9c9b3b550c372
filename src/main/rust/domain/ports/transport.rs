use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::domain::errors::{DomainError, Result};
use crate::domain::value_objects::{CameraId, StreamMode};

/// What a transport reports about itself
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// Media (or the first frame) is flowing
    Connected,
    /// The instance is unusable; the supervisor decides what happens next
    Error(DomainError),
    /// Informational degradation that must not change connection state
    Degraded(String),
}

/// A signal stamped with the generation of the instance that raised it
#[derive(Debug, Clone, PartialEq)]
pub struct TransportNotice {
    pub generation: u64,
    pub mode: StreamMode,
    pub signal: TransportSignal,
}

/// Callback sink handed to a transport on connect.
///
/// The sink is bound to one generation. Once revoked, every call is dropped
/// so late callbacks from a torn-down instance never reach the supervisor.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    generation: u64,
    mode: StreamMode,
    alive: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<TransportNotice>,
}

impl TransportEvents {
    pub fn new(
        generation: u64,
        mode: StreamMode,
        tx: mpsc::UnboundedSender<TransportNotice>,
    ) -> Self {
        Self {
            generation,
            mode,
            alive: Arc::new(AtomicBool::new(true)),
            tx,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Stop forwarding; shared by every clone of this sink
    pub fn revoke(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn on_connected(&self) {
        self.emit(TransportSignal::Connected);
    }

    pub fn on_error(&self, error: DomainError) {
        self.emit(TransportSignal::Error(error));
    }

    pub fn on_degraded(&self, detail: impl Into<String>) {
        self.emit(TransportSignal::Degraded(detail.into()));
    }

    fn emit(&self, signal: TransportSignal) {
        if !self.is_alive() {
            tracing::trace!(generation = self.generation, ?signal, "Dropping stale transport signal");
            return;
        }
        let _ = self.tx.send(TransportNotice {
            generation: self.generation,
            mode: self.mode,
            signal,
        });
    }
}

/// Point-in-time view of a transport's internals
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportDiagnostics {
    pub mode: StreamMode,
    pub session_id: Option<String>,
    pub peer_state: Option<String>,
    pub liveness: Option<String>,
    pub liveness_rtt_ms: Option<u64>,
    pub keepalive: Option<String>,
    pub player_reloads: Option<u32>,
    pub frames_rendered: Option<u64>,
    pub consecutive_failures: Option<u32>,
    pub destroyed: bool,
}

/// One way of getting pixels from the backend onto a surface
#[async_trait]
pub trait Transport: Send + Sync {
    fn mode(&self) -> StreamMode;

    /// Negotiate or start the stream. Returns once the transport is set up;
    /// later failures arrive through `events`.
    async fn connect(&self, camera_id: CameraId, events: TransportEvents) -> Result<()>;

    /// Ask for fresh content without tearing the transport down
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    /// Tear down every resource. Safe to call repeatedly and concurrently.
    async fn cleanup(&self);

    fn diagnostics(&self) -> TransportDiagnostics;
}
