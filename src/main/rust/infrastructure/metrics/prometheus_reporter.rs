use lazy_static::lazy_static;
use prometheus::{
    Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

use crate::domain::ports::MetricsReporter;
use crate::domain::value_objects::{LifecycleState, StreamMode};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref LIFECYCLE_STATE: Gauge = Gauge::new(
        "live_view_lifecycle_state",
        "Connection lifecycle (0=idle, 1=connecting, 2=connected, 3=reconnecting, 4=failed)"
    ).expect("metric can be created");
    pub static ref ACTIVE_MODE: Gauge = Gauge::new(
        "live_view_active_mode",
        "Active stream mode (0=realtime, 1=segmented_http, 2=snapshot)"
    ).expect("metric can be created");
    pub static ref CONNECTED: IntGauge = IntGauge::new(
        "live_view_connected",
        "1 while a transport is delivering video"
    ).expect("metric can be created");
    pub static ref RECONNECT_ATTEMPTS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "live_view_reconnect_attempts_total",
            "Scheduled reconnection attempts by mode"
        ),
        &["mode"]
    ).expect("metric can be created");
    pub static ref BACKOFF_SECONDS: Gauge = Gauge::new(
        "live_view_backoff_seconds",
        "Delay before the pending reconnection attempt"
    ).expect("metric can be created");
    pub static ref FALLBACKS: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "live_view_fallbacks_total",
            "Automatic demotions to a lower-quality mode"
        ),
        &["from", "to"]
    ).expect("metric can be created");
    pub static ref FRAMES_RENDERED: IntCounter = IntCounter::new(
        "live_view_frames_rendered_total",
        "Snapshot frames drawn on the raster surface"
    ).expect("metric can be created");
    pub static ref SESSIONS_RELEASED: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "live_view_sessions_released_total",
            "Backend sessions released after teardown"
        ),
        &["mode"]
    ).expect("metric can be created");
}

pub struct PrometheusReporter;

impl PrometheusReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn init_metrics() -> Result<(), prometheus::Error> {
        REGISTRY.register(Box::new(LIFECYCLE_STATE.clone()))?;
        REGISTRY.register(Box::new(ACTIVE_MODE.clone()))?;
        REGISTRY.register(Box::new(CONNECTED.clone()))?;
        REGISTRY.register(Box::new(RECONNECT_ATTEMPTS.clone()))?;
        REGISTRY.register(Box::new(BACKOFF_SECONDS.clone()))?;
        REGISTRY.register(Box::new(FALLBACKS.clone()))?;
        REGISTRY.register(Box::new(FRAMES_RENDERED.clone()))?;
        REGISTRY.register(Box::new(SESSIONS_RELEASED.clone()))?;
        Ok(())
    }

    pub fn gather_metrics() -> Vec<u8> {
        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = vec![];
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return b"# Error encoding metrics\n".to_vec();
        }
        buffer
    }
}

impl Default for PrometheusReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn mode_label(mode: StreamMode) -> String {
    mode.to_string().to_ascii_lowercase()
}

impl MetricsReporter for PrometheusReporter {
    fn report_lifecycle(&self, state: &LifecycleState) {
        LIFECYCLE_STATE.set(state.as_metric());
    }

    fn report_mode(&self, mode: StreamMode) {
        ACTIVE_MODE.set(mode.as_metric());
    }

    fn report_connected(&self, connected: bool) {
        CONNECTED.set(i64::from(connected));
    }

    fn report_reconnect_attempt(&self, mode: StreamMode) {
        RECONNECT_ATTEMPTS
            .with_label_values(&[&mode_label(mode)])
            .inc();
    }

    fn report_backoff(&self, delay_secs: f64) {
        BACKOFF_SECONDS.set(delay_secs);
    }

    fn report_fallback(&self, from: StreamMode, to: StreamMode) {
        FALLBACKS
            .with_label_values(&[&mode_label(from), &mode_label(to)])
            .inc();
    }

    fn report_frame_rendered(&self) {
        FRAMES_RENDERED.inc();
    }

    fn report_session_released(&self, mode: StreamMode) {
        SESSIONS_RELEASED
            .with_label_values(&[&mode_label(mode)])
            .inc();
    }
}
