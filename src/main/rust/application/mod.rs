pub mod services;
pub mod transports;
