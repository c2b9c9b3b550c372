use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::domain::ports::{Frame, MediaSource, PlaybackSurfaces};

/// Hands the view's surfaces to one transport generation at a time.
///
/// Leases are ordered by generation; once a newer lease exists, every
/// operation through an older one is a no-op.
#[derive(Clone)]
pub struct SurfaceArbiter {
    surfaces: PlaybackSurfaces,
    owner: Arc<AtomicU64>,
}

impl SurfaceArbiter {
    pub fn new(surfaces: PlaybackSurfaces) -> Self {
        Self {
            surfaces,
            owner: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn lease(&self, generation: u64) -> SurfaceLease {
        self.owner.fetch_max(generation, Ordering::SeqCst);
        SurfaceLease {
            surfaces: self.surfaces.clone(),
            owner: self.owner.clone(),
            generation,
        }
    }

    pub fn owner(&self) -> u64 {
        self.owner.load(Ordering::SeqCst)
    }
}

pub struct SurfaceLease {
    surfaces: PlaybackSurfaces,
    owner: Arc<AtomicU64>,
    generation: u64,
}

impl SurfaceLease {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.owner.load(Ordering::SeqCst) == self.generation
    }

    /// Returns false when the lease is stale and nothing was attached
    pub fn attach(&self, source: MediaSource) -> bool {
        if !self.is_current() {
            tracing::debug!(generation = self.generation, "Stale lease, not attaching media");
            return false;
        }
        self.surfaces.media.attach(source);
        true
    }

    pub fn draw(&self, frame: Frame) -> bool {
        if !self.is_current() {
            return false;
        }
        self.surfaces.raster.draw(frame);
        true
    }

    pub fn detach(&self) {
        if self.is_current() {
            self.surfaces.media.detach();
        }
    }

    pub fn clear(&self) {
        if self.is_current() {
            self.surfaces.raster.clear();
        }
    }
}
