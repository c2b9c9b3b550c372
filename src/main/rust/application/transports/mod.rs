mod factory;
mod realtime;
mod segmented;
mod snapshot;
mod surface_lease;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;

use crate::domain::errors::DomainError;
use crate::domain::ports::{MetricsReporter, StreamingBackend};
use crate::domain::value_objects::{BackendConfig, SessionHandle, StreamMode, TransportTimings};

pub use factory::{PortTransportFactory, TransportFactory, TransportPorts};
pub use realtime::RealtimeTransport;
pub use segmented::SegmentedTransport;
pub use snapshot::SnapshotTransport;
pub use surface_lease::{SurfaceArbiter, SurfaceLease};

/// Collaborators shared by every transport instance
#[derive(Clone)]
pub struct TransportContext {
    pub backend: Arc<dyn StreamingBackend>,
    pub backend_config: BackendConfig,
    pub surfaces: SurfaceArbiter,
    pub timings: TransportTimings,
    pub metrics: Arc<dyn MetricsReporter>,
}

impl TransportContext {
    /// Release a backend session after the grace delay, logging instead of failing
    pub(crate) fn spawn_release(&self, mode: StreamMode, handle: SessionHandle) -> JoinHandle<()> {
        let backend = self.backend.clone();
        let metrics = self.metrics.clone();
        let grace = self.timings.release_grace();

        tokio::spawn(async move {
            if !grace.is_zero() {
                tokio::time::sleep(grace).await;
            }
            let result = match mode {
                StreamMode::Realtime => backend.delete_realtime_session(&handle).await,
                StreamMode::SegmentedHttp => backend.stop_hls(&handle).await,
                StreamMode::Snapshot => Ok(()),
            };
            match result {
                Ok(()) => {
                    tracing::info!(session_id = %handle, %mode, "Backend session released");
                    metrics.report_session_released(mode);
                }
                Err(e) => {
                    let err = DomainError::Release(e.to_string());
                    tracing::warn!(session_id = %handle, %mode, "{}", err);
                }
            }
        })
    }
}

pub(crate) fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

pub(crate) fn abort_all(tasks: Vec<JoinHandle<()>>) {
    for task in tasks {
        task.abort();
    }
}

/// First tick one full period from now, then every period
pub(crate) fn delayed_interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval
}
