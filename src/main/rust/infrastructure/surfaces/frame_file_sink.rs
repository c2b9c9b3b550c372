use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::domain::ports::{Frame, RasterSink};

enum FileOp {
    Write(Bytes),
    Remove,
}

/// The mirrored file. Operations carry a sequence number and an older one
/// never overwrites a newer one, whatever order the blocking pool runs them in.
struct FrameFile {
    path: PathBuf,
    applied: Mutex<u64>,
}

impl FrameFile {
    fn apply(&self, seq: u64, op: FileOp) {
        let mut applied = self.applied.lock();
        if seq <= *applied {
            return;
        }
        *applied = seq;

        let result = match op {
            FileOp::Write(data) => write_atomically(&self.path, &data),
            FileOp::Remove => match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), "Failed to update frame file: {}", e);
        }
    }
}

/// Write next to the target, then rename so readers never see a torn JPEG
fn write_atomically(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".part");
    let staging = PathBuf::from(staging);
    std::fs::write(&staging, data)?;
    std::fs::rename(&staging, path)
}

/// Raster surface for a headless client: keeps the latest frame's geometry and
/// optionally mirrors the JPEG to a file that viewers can poll.
///
/// `draw` and `clear` are called with transport locks held, so file I/O goes to
/// the blocking pool when a runtime is available.
pub struct FrameFileSink {
    file: Option<Arc<FrameFile>>,
    ops: AtomicU64,
    frames: AtomicU64,
    last_size: Mutex<Option<(u32, u32)>>,
}

impl FrameFileSink {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            file: path.map(|path| {
                Arc::new(FrameFile {
                    path,
                    applied: Mutex::new(0),
                })
            }),
            ops: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            last_size: Mutex::new(None),
        }
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn last_size(&self) -> Option<(u32, u32)> {
        *self.last_size.lock()
    }

    fn submit(&self, op: FileOp) {
        let Some(file) = self.file.clone() else {
            return;
        };
        let seq = self.ops.fetch_add(1, Ordering::SeqCst) + 1;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || file.apply(seq, op));
            }
            Err(_) => file.apply(seq, op),
        }
    }
}

impl RasterSink for FrameFileSink {
    fn draw(&self, frame: Frame) {
        let count = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        *self.last_size.lock() = Some((frame.width, frame.height));
        tracing::debug!(
            frame = count,
            width = frame.width,
            height = frame.height,
            "Frame drawn"
        );
        self.submit(FileOp::Write(frame.data));
    }

    fn clear(&self) {
        *self.last_size.lock() = None;
        self.submit(FileOp::Remove);
    }
}
