use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::domain::ports::{MediaSink, MediaSource};

const LOG_EVERY_PACKETS: u64 = 500;

#[derive(Default)]
struct Attached {
    reader: Option<JoinHandle<()>>,
    playlist: Option<String>,
}

/// Media surface for a headless client. Realtime tracks are drained and
/// counted; playlists are rendered by the player, so only the URL is kept.
#[derive(Default)]
pub struct TrackStatsSink {
    packets: Arc<AtomicU64>,
    bytes: Arc<AtomicU64>,
    attached: Mutex<Attached>,
}

impl TrackStatsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn playlist(&self) -> Option<String> {
        self.attached.lock().playlist.clone()
    }
}

impl MediaSink for TrackStatsSink {
    fn attach(&self, source: MediaSource) {
        let mut attached = self.attached.lock();
        if let Some(reader) = attached.reader.take() {
            reader.abort();
        }

        match source {
            MediaSource::Track(mut track) => {
                tracing::info!(track_id = %track.id, mime = %track.mime_type, "Track attached");
                attached.playlist = None;
                let packets = self.packets.clone();
                let bytes = self.bytes.clone();
                attached.reader = Some(tokio::spawn(async move {
                    while let Some(payload) = track.packets.recv().await {
                        let count = packets.fetch_add(1, Ordering::Relaxed) + 1;
                        bytes.fetch_add(payload.len() as u64, Ordering::Relaxed);
                        if count % LOG_EVERY_PACKETS == 0 {
                            tracing::debug!(
                                packets = count,
                                bytes = bytes.load(Ordering::Relaxed),
                                "Track progress"
                            );
                        }
                    }
                    tracing::debug!(track_id = %track.id, "Track ended");
                }));
            }
            MediaSource::Playlist { url } => {
                tracing::info!(url = %url, "Playlist attached");
                attached.playlist = Some(url);
            }
        }
    }

    fn detach(&self) {
        let mut attached = self.attached.lock();
        if let Some(reader) = attached.reader.take() {
            reader.abort();
        }
        attached.playlist = None;
    }
}
