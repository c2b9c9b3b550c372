mod connection_change_filter;
mod connection_lifecycle;
mod fallback_selector;
mod session_slot;

pub use connection_change_filter::ConnectionChangeFilter;
pub use connection_lifecycle::{ConnectionLifecycle, FailureOutcome, StateTransition};
pub use fallback_selector::FallbackSelector;
pub use session_slot::SessionSlot;
