use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Delivery strategy for a camera view, declared best-first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamMode {
    /// Peer media session, best quality and latency
    Realtime,
    /// Backend-assembled HLS stream
    SegmentedHttp,
    /// Still frames, most robust and cheapest
    Snapshot,
}

impl StreamMode {
    /// All modes in preference order
    pub const PREFERENCE: [StreamMode; 3] = [
        StreamMode::Realtime,
        StreamMode::SegmentedHttp,
        StreamMode::Snapshot,
    ];

    /// Position in the preference order (0 is best)
    pub fn rank(&self) -> usize {
        match self {
            Self::Realtime => 0,
            Self::SegmentedHttp => 1,
            Self::Snapshot => 2,
        }
    }

    /// Modes strictly less preferred than this one, best first
    pub fn demotions(&self) -> impl Iterator<Item = StreamMode> {
        let rank = self.rank();
        Self::PREFERENCE.into_iter().skip(rank + 1)
    }

    /// Next mode in the manual toggle cycle
    pub fn toggled(&self) -> StreamMode {
        match self {
            Self::Realtime => Self::SegmentedHttp,
            Self::SegmentedHttp => Self::Snapshot,
            Self::Snapshot => Self::Realtime,
        }
    }

    /// Numeric value for the active-mode gauge
    pub fn as_metric(&self) -> f64 {
        self.rank() as f64
    }
}

impl Default for StreamMode {
    fn default() -> Self {
        Self::Realtime
    }
}

impl fmt::Display for StreamMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Realtime => write!(f, "REALTIME"),
            Self::SegmentedHttp => write!(f, "SEGMENTED_HTTP"),
            Self::Snapshot => write!(f, "SNAPSHOT"),
        }
    }
}

impl FromStr for StreamMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "realtime" | "webrtc" => Ok(Self::Realtime),
            "segmented" | "segmented_http" | "hls" => Ok(Self::SegmentedHttp),
            "snapshot" => Ok(Self::Snapshot),
            other => Err(format!(
                "unknown stream mode '{}' (expected realtime, segmented or snapshot)",
                other
            )),
        }
    }
}
