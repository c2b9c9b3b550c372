use std::time::Duration;

use crate::domain::errors::{DomainError, Result};

/// How the snapshot transport obtains frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotStrategy {
    /// Periodic GET of a single frame
    Poll,
    /// Persistent socket with backend-pushed frames
    Push,
}

/// Encoding requested from the poll endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    /// `GET /cameras/{id}/snapshot`, raw JPEG body
    Binary,
    /// `GET /cameras/{id}/snapshot/base64`, JSON envelope
    Base64,
}

/// Timer and retry knobs shared by the transports
#[derive(Debug, Clone, PartialEq)]
pub struct TransportTimings {
    stun_servers: Vec<String>,
    liveness_interval: Duration,
    liveness_silence_intervals: u32,
    release_grace: Duration,
    snapshot_strategy: SnapshotStrategy,
    snapshot_format: SnapshotFormat,
    snapshot_interval: Duration,
    snapshot_ping_interval: Duration,
    snapshot_max_fetch_failures: u32,
    keepalive_interval: Duration,
    player_max_reloads: u32,
    escalate_expired_keepalive: bool,
}

impl TransportTimings {
    pub fn with_stun_servers(mut self, servers: Vec<String>) -> Self {
        self.stun_servers = servers;
        self
    }

    pub fn with_liveness_interval(mut self, interval: Duration) -> Result<Self> {
        self.liveness_interval = Self::non_zero(interval, "liveness")?;
        Ok(self)
    }

    pub fn with_release_grace(mut self, grace: Duration) -> Self {
        self.release_grace = grace;
        self
    }

    pub fn with_snapshot_strategy(mut self, strategy: SnapshotStrategy) -> Self {
        self.snapshot_strategy = strategy;
        self
    }

    pub fn with_snapshot_format(mut self, format: SnapshotFormat) -> Self {
        self.snapshot_format = format;
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Result<Self> {
        self.snapshot_interval = Self::non_zero(interval, "snapshot")?;
        Ok(self)
    }

    pub fn with_keepalive_interval(mut self, interval: Duration) -> Result<Self> {
        self.keepalive_interval = Self::non_zero(interval, "keep-alive")?;
        Ok(self)
    }

    pub fn with_player_max_reloads(mut self, reloads: u32) -> Self {
        self.player_max_reloads = reloads;
        self
    }

    pub fn with_escalate_expired_keepalive(mut self, escalate: bool) -> Self {
        self.escalate_expired_keepalive = escalate;
        self
    }

    /// Tokio intervals panic on a zero period
    fn non_zero(interval: Duration, name: &'static str) -> Result<Duration> {
        if interval.is_zero() {
            return Err(DomainError::InvalidInterval(name));
        }
        Ok(interval)
    }

    pub fn stun_servers(&self) -> &[String] {
        &self.stun_servers
    }

    pub fn liveness_interval(&self) -> Duration {
        self.liveness_interval
    }

    /// Silence longer than this marks the liveness channel as stale
    pub fn liveness_timeout(&self) -> Duration {
        self.liveness_interval * self.liveness_silence_intervals
    }

    pub fn release_grace(&self) -> Duration {
        self.release_grace
    }

    pub fn snapshot_strategy(&self) -> SnapshotStrategy {
        self.snapshot_strategy
    }

    pub fn snapshot_format(&self) -> SnapshotFormat {
        self.snapshot_format
    }

    pub fn snapshot_interval(&self) -> Duration {
        self.snapshot_interval
    }

    pub fn snapshot_ping_interval(&self) -> Duration {
        self.snapshot_ping_interval
    }

    pub fn snapshot_max_fetch_failures(&self) -> u32 {
        self.snapshot_max_fetch_failures
    }

    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive_interval
    }

    pub fn player_max_reloads(&self) -> u32 {
        self.player_max_reloads
    }

    pub fn escalate_expired_keepalive(&self) -> bool {
        self.escalate_expired_keepalive
    }
}

impl Default for TransportTimings {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            liveness_interval: Duration::from_secs(5),
            liveness_silence_intervals: 3,
            release_grace: Duration::from_millis(500),
            snapshot_strategy: SnapshotStrategy::Poll,
            snapshot_format: SnapshotFormat::Binary,
            snapshot_interval: Duration::from_secs(2),
            snapshot_ping_interval: Duration::from_secs(30),
            snapshot_max_fetch_failures: 3,
            keepalive_interval: Duration::from_secs(30),
            player_max_reloads: 3,
            escalate_expired_keepalive: false,
        }
    }
}
