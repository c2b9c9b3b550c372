/// Suppresses repeated connected/disconnected notifications
#[derive(Debug, Default)]
pub struct ConnectionChangeFilter {
    last: Option<bool>,
}

impl ConnectionChangeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `connected` differs from the last accepted value
    pub fn accept(&mut self, connected: bool) -> bool {
        if self.last == Some(connected) {
            return false;
        }
        self.last = Some(connected);
        true
    }
}
