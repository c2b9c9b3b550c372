mod snapshot_socket;

pub use snapshot_socket::TungsteniteSnapshotConnector;
