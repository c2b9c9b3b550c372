use std::collections::BTreeSet;

use crate::domain::value_objects::StreamMode;

/// Chooses the next transport mode once the current one is exhausted.
///
/// The failed set lives for one view session; `reset` is the manual
/// "retry high quality" action.
#[derive(Debug, Default)]
pub struct FallbackSelector {
    failed: BTreeSet<StreamMode>,
}

impl FallbackSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `current` as exhausted and pick the next mode to try.
    ///
    /// Returns the best mode strictly below `current` that has not failed
    /// yet, or SNAPSHOT as the permanent fallback.
    pub fn next_after_exhaustion(&mut self, current: StreamMode) -> StreamMode {
        self.failed.insert(current);

        current
            .demotions()
            .find(|mode| !self.failed.contains(mode))
            .unwrap_or(StreamMode::Snapshot)
    }

    /// Whether exhausting `current` leaves nothing further to demote to
    pub fn is_terminal(&self, current: StreamMode) -> bool {
        current == StreamMode::Snapshot
    }

    pub fn has_failed(&self, mode: StreamMode) -> bool {
        self.failed.contains(&mode)
    }

    /// Clear the failed set and restart at the best mode
    pub fn reset(&mut self) -> StreamMode {
        self.failed.clear();
        StreamMode::Realtime
    }
}
