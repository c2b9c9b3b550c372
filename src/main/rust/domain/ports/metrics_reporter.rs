use crate::domain::value_objects::{LifecycleState, StreamMode};

/// Port for metrics reporting
pub trait MetricsReporter: Send + Sync {
    fn report_lifecycle(&self, state: &LifecycleState);
    fn report_mode(&self, mode: StreamMode);
    fn report_connected(&self, connected: bool);
    fn report_reconnect_attempt(&self, mode: StreamMode);
    fn report_backoff(&self, delay_secs: f64);
    fn report_fallback(&self, from: StreamMode, to: StreamMode);
    fn report_frame_rendered(&self);
    fn report_session_released(&self, mode: StreamMode);
}

/// Reporter that drops everything, for embedders without a metrics endpoint
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl MetricsReporter for NoopReporter {
    fn report_lifecycle(&self, _state: &LifecycleState) {}
    fn report_mode(&self, _mode: StreamMode) {}
    fn report_connected(&self, _connected: bool) {}
    fn report_reconnect_attempt(&self, _mode: StreamMode) {}
    fn report_backoff(&self, _delay_secs: f64) {}
    fn report_fallback(&self, _from: StreamMode, _to: StreamMode) {}
    fn report_frame_rendered(&self) {}
    fn report_session_released(&self, _mode: StreamMode) {}
}
