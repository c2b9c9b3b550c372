use tokio::sync::mpsc;

use crate::domain::errors::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    Playing,
    /// Playback stopped with an error; the player may be reloaded
    Error(String),
    /// End of stream; for a live playlist this means the feed stalled
    Ended,
}

/// Adaptive-streaming player bound to one playlist at a time
pub trait MediaPlayer: Send + Sync {
    /// Start (or restart) playback of the given URL
    fn load(&self, url: &str) -> Result<()>;

    /// Stop playback and release the pipeline. Idempotent.
    fn stop(&self);
}

pub trait PlayerFactory: Send + Sync {
    fn create(&self) -> Result<(Box<dyn MediaPlayer>, mpsc::UnboundedReceiver<PlayerEvent>)>;
}
