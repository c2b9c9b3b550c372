use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::application::services::SupervisorSettings;
use crate::domain::value_objects::{
    BackendConfig, BackoffPolicy, CameraId, SnapshotFormat, SnapshotStrategy, StreamMode,
    TransportTimings,
};
use crate::infrastructure::gstreamer::DEFAULT_VIDEO_SINK;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStrategyArg {
    Poll,
    Push,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormatArg {
    Binary,
    Base64,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "live-view",
    version,
    about = "Adaptive live-view client: WebRTC, HLS or snapshots with automatic fallback"
)]
pub struct Config {
    /// Backend API base URL
    #[arg(long, env = "API_URL", default_value = "http://localhost:8000/api")]
    pub api_url: String,

    /// Camera to watch
    #[arg(short = 'c', long, env = "CAMERA_ID", default_value = "1")]
    pub camera_id: u32,

    /// Preferred stream mode (realtime, segmented, snapshot)
    #[arg(short = 'm', long, env = "STREAM_MODE", default_value = "realtime")]
    pub mode: StreamMode,

    /// How snapshots are obtained
    #[arg(long, value_enum, default_value = "poll")]
    pub snapshot_strategy: SnapshotStrategyArg,

    /// Encoding of polled snapshots
    #[arg(long, value_enum, default_value = "binary")]
    pub snapshot_format: SnapshotFormatArg,

    /// Snapshot poll period
    #[arg(long, default_value = "2000")]
    pub snapshot_interval_ms: u64,

    /// STUN server, may be repeated
    #[arg(long = "stun-url")]
    pub stun_urls: Vec<String>,

    /// Metrics server port
    #[arg(long, env = "METRICS_PORT", default_value = "9100")]
    pub metrics_port: u16,

    #[arg(long, default_value = "1000")]
    pub reconnect_initial_delay_ms: u64,

    #[arg(long, default_value = "30000")]
    pub reconnect_max_delay_ms: u64,

    #[arg(long, default_value = "2.0")]
    pub reconnect_multiplier: f64,

    /// Attempts per mode before falling back
    #[arg(long, default_value = "5")]
    pub max_attempts: u32,

    /// Stay on the requested mode instead of demoting
    #[arg(long)]
    pub no_fallback: bool,

    /// Treat an expired segmented session as fatal
    #[arg(long)]
    pub escalate_expired_keepalive: bool,

    /// Skip the camera status check before connecting
    #[arg(long)]
    pub skip_status_check: bool,

    /// Mirror the latest snapshot to this file
    #[arg(long)]
    pub frame_output: Option<PathBuf>,

    /// GStreamer video sink used for playlists
    #[arg(long, default_value = DEFAULT_VIDEO_SINK)]
    pub video_sink: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Minimum allowed port (ports below 1024 are privileged)
const MIN_USER_PORT: u16 = 1024;

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        BackendConfig::new(self.api_url.as_str())
            .map_err(|e| anyhow::anyhow!("Invalid API URL: {}", e))?;

        Self::validate_port(self.metrics_port, "metrics")?;

        if self.reconnect_initial_delay_ms == 0 {
            anyhow::bail!("Reconnect initial delay must be greater than 0");
        }

        if self.reconnect_max_delay_ms < self.reconnect_initial_delay_ms {
            anyhow::bail!(
                "Reconnect max delay ({}ms) must be >= initial delay ({}ms)",
                self.reconnect_max_delay_ms,
                self.reconnect_initial_delay_ms
            );
        }

        if self.reconnect_multiplier <= 1.0 {
            anyhow::bail!(
                "Reconnect multiplier must be greater than 1.0, got {}",
                self.reconnect_multiplier
            );
        }

        if self.max_attempts == 0 {
            anyhow::bail!("Max attempts must be at least 1");
        }

        if self.snapshot_interval_ms == 0 {
            anyhow::bail!("Snapshot interval must be greater than 0");
        }

        for url in &self.stun_urls {
            if !(url.starts_with("stun:") || url.starts_with("turn:")) {
                anyhow::bail!("STUN URL must start with 'stun:' or 'turn:': {}", url);
            }
        }

        Ok(())
    }

    fn validate_port(port: u16, name: &str) -> anyhow::Result<()> {
        if port == 0 {
            anyhow::bail!("Invalid {} port: port cannot be 0", name);
        }
        if port < MIN_USER_PORT {
            anyhow::bail!(
                "Invalid {} port: {} is a privileged port (< {}). Use a port >= {}",
                name,
                port,
                MIN_USER_PORT,
                MIN_USER_PORT
            );
        }
        Ok(())
    }

    pub fn camera(&self) -> CameraId {
        CameraId::new(self.camera_id)
    }

    pub fn to_backend_config(&self) -> anyhow::Result<BackendConfig> {
        BackendConfig::new(self.api_url.as_str()).map_err(|e| anyhow::anyhow!("{}", e))
    }

    pub fn to_backoff_policy(&self) -> anyhow::Result<BackoffPolicy> {
        BackoffPolicy::new(
            Duration::from_millis(self.reconnect_initial_delay_ms),
            Duration::from_millis(self.reconnect_max_delay_ms),
            self.reconnect_multiplier,
            self.max_attempts,
        )
        .map_err(|e| anyhow::anyhow!("{}", e))
    }

    pub fn to_timings(&self) -> anyhow::Result<TransportTimings> {
        let strategy = match self.snapshot_strategy {
            SnapshotStrategyArg::Poll => SnapshotStrategy::Poll,
            SnapshotStrategyArg::Push => SnapshotStrategy::Push,
        };
        let format = match self.snapshot_format {
            SnapshotFormatArg::Binary => SnapshotFormat::Binary,
            SnapshotFormatArg::Base64 => SnapshotFormat::Base64,
        };

        let timings = TransportTimings::default()
            .with_snapshot_strategy(strategy)
            .with_snapshot_format(format)
            .with_escalate_expired_keepalive(self.escalate_expired_keepalive)
            .with_snapshot_interval(Duration::from_millis(self.snapshot_interval_ms))
            .map_err(|e| anyhow::anyhow!("{}", e))?;

        if self.stun_urls.is_empty() {
            Ok(timings)
        } else {
            Ok(timings.with_stun_servers(self.stun_urls.clone()))
        }
    }

    pub fn to_settings(&self) -> anyhow::Result<SupervisorSettings> {
        Ok(SupervisorSettings {
            backoff: self.to_backoff_policy()?,
            auto_fallback: !self.no_fallback,
            check_camera_status: !self.skip_status_check,
        })
    }
}
