use parking_lot::Mutex;

use crate::domain::value_objects::SessionHandle;

#[derive(Debug, Default)]
struct SlotState {
    handle: Option<SessionHandle>,
    released: bool,
}

/// Holds a transport's backend session and hands it out for release once.
///
/// After `take_for_release` has returned a handle, or after the slot was
/// closed while empty, a late `record` yields the handle straight back so
/// the caller can release it itself. Either way a handle is released at
/// most once.
#[derive(Debug, Default)]
pub struct SessionSlot {
    state: Mutex<SlotState>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the handle returned by the backend.
    ///
    /// Returns `Some(handle)` when the slot is already closed; the caller owns
    /// that release.
    pub fn record(&self, handle: SessionHandle) -> Option<SessionHandle> {
        let mut state = self.state.lock();
        if state.released {
            return Some(handle);
        }
        state.handle = Some(handle);
        None
    }

    /// Close the slot and take the handle, if any, for release
    pub fn take_for_release(&self) -> Option<SessionHandle> {
        let mut state = self.state.lock();
        state.released = true;
        state.handle.take()
    }

    pub fn current(&self) -> Option<SessionHandle> {
        self.state.lock().handle.clone()
    }
}
