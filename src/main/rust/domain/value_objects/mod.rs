mod backend_config;
mod backoff_policy;
mod camera_id;
mod connection_state;
mod lifecycle_state;
mod retry_state;
mod session_handle;
mod stream_mode;
mod transport_timings;

pub use backend_config::BackendConfig;
pub use backoff_policy::BackoffPolicy;
pub use camera_id::CameraId;
pub use connection_state::ConnectionState;
pub use lifecycle_state::LifecycleState;
pub use retry_state::RetryState;
pub use session_handle::SessionHandle;
pub use stream_mode::StreamMode;
pub use transport_timings::{SnapshotFormat, SnapshotStrategy, TransportTimings};
