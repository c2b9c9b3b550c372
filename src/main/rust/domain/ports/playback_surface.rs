use std::sync::Arc;

use bytes::Bytes;

use super::RemoteTrack;

/// A validated still image ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    /// Capture time reported by the backend, seconds since epoch
    pub captured_at: Option<f64>,
}

#[derive(Debug)]
pub enum MediaSource {
    Track(RemoteTrack),
    Playlist { url: String },
}

/// Surface that plays continuous media (a realtime track or a playlist)
pub trait MediaSink: Send + Sync {
    fn attach(&self, source: MediaSource);
    fn detach(&self);
}

/// Surface that displays still frames
pub trait RasterSink: Send + Sync {
    fn draw(&self, frame: Frame);
    fn clear(&self);
}

/// The pair of surfaces owned by the host view
#[derive(Clone)]
pub struct PlaybackSurfaces {
    pub media: Arc<dyn MediaSink>,
    pub raster: Arc<dyn RasterSink>,
}

impl PlaybackSurfaces {
    pub fn new(media: Arc<dyn MediaSink>, raster: Arc<dyn RasterSink>) -> Self {
        Self { media, raster }
    }
}
