mod stream_supervisor;

pub use stream_supervisor::{
    ConnectRequest, ConnectionCallback, ErrorCallback, StreamSupervisor, SupervisorDeps,
    SupervisorSettings, SupervisorStatus,
};
