use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use gstreamer::prelude::*;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::PipelineBuilder;
use crate::domain::errors::{DomainError, Result};
use crate::domain::ports::{MediaPlayer, PlayerEvent, PlayerFactory};

/// Timeout for bus polling (100ms allows responsive shutdown)
const BUS_POLL_TIMEOUT_MS: u64 = 100;

pub const DEFAULT_VIDEO_SINK: &str = "fakesink sync=true";

struct Running {
    pipeline: gstreamer::Pipeline,
    active: Arc<AtomicBool>,
}

/// GStreamer playbin driven from a dedicated bus thread
pub struct PlaybinPlayer {
    video_sink: String,
    events: mpsc::UnboundedSender<PlayerEvent>,
    running: Mutex<Option<Running>>,
}

impl PlaybinPlayer {
    fn new(video_sink: String, events: mpsc::UnboundedSender<PlayerEvent>) -> Self {
        Self {
            video_sink,
            events,
            running: Mutex::new(None),
        }
    }

    fn create_pipeline(&self, url: &str) -> anyhow::Result<gstreamer::Pipeline> {
        let pipeline_str = PipelineBuilder::build_playlist_string(url, &self.video_sink);
        tracing::debug!("Creating pipeline: {}", pipeline_str);

        let pipeline = gstreamer::parse::launch(&pipeline_str)
            .context("Failed to parse pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow::anyhow!("Failed to downcast to Pipeline"))?;

        Ok(pipeline)
    }

    /// Map one bus message; `Some` ends the bus loop after forwarding the event
    fn process_bus_message(
        msg: &gstreamer::Message,
        pipeline: &gstreamer::Pipeline,
        playing_seen: &mut bool,
    ) -> Option<PlayerEvent> {
        match msg.view() {
            gstreamer::MessageView::Eos(_) => {
                tracing::info!("Playlist reached end of stream");
                Some(PlayerEvent::Ended)
            }
            gstreamer::MessageView::Error(err) => Some(PlayerEvent::Error(format!(
                "Error from {:?}: {} ({:?})",
                err.src().map(|s| s.path_string()),
                err.error(),
                err.debug()
            ))),
            gstreamer::MessageView::StateChanged(state_changed) => {
                let from_pipeline = state_changed
                    .src()
                    .map(|s| s == pipeline)
                    .unwrap_or(false);
                if from_pipeline {
                    tracing::debug!(
                        "Player state changed from {:?} to {:?}",
                        state_changed.old(),
                        state_changed.current()
                    );
                    if state_changed.current() == gstreamer::State::Playing && !*playing_seen {
                        *playing_seen = true;
                        return Some(PlayerEvent::Playing);
                    }
                }
                None
            }
            gstreamer::MessageView::Warning(warn) => {
                tracing::warn!(
                    "Warning from {:?}: {} ({:?})",
                    warn.src().map(|s| s.path_string()),
                    warn.error(),
                    warn.debug()
                );
                None
            }
            _ => None,
        }
    }

    fn spawn_bus_loop(
        pipeline: gstreamer::Pipeline,
        active: Arc<AtomicBool>,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Result<()> {
        let bus = pipeline
            .bus()
            .ok_or_else(|| DomainError::Player("Failed to get bus".to_string()))?;

        std::thread::Builder::new()
            .name("playbin-bus".to_string())
            .spawn(move || {
                let timeout = gstreamer::ClockTime::from_mseconds(BUS_POLL_TIMEOUT_MS);
                let mut playing_seen = false;

                while active.load(Ordering::SeqCst) {
                    let Some(msg) = bus.timed_pop(timeout) else {
                        continue;
                    };
                    let Some(event) = Self::process_bus_message(&msg, &pipeline, &mut playing_seen)
                    else {
                        continue;
                    };
                    // A stopped or replaced player must not leak events
                    if !active.load(Ordering::SeqCst) {
                        break;
                    }
                    let terminal = !matches!(event, PlayerEvent::Playing);
                    if events.send(event).is_err() || terminal {
                        break;
                    }
                }
            })
            .map_err(|e| DomainError::Player(format!("Failed to spawn bus thread: {}", e)))?;

        Ok(())
    }

    fn shutdown(running: Running) {
        running.active.store(false, Ordering::SeqCst);
        let _ = running.pipeline.set_state(gstreamer::State::Null);
    }
}

impl MediaPlayer for PlaybinPlayer {
    fn load(&self, url: &str) -> Result<()> {
        let mut running = self.running.lock();
        if let Some(previous) = running.take() {
            Self::shutdown(previous);
        }

        let pipeline = self
            .create_pipeline(url)
            .map_err(|e| DomainError::Player(e.to_string()))?;
        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| DomainError::Player(e.to_string()))?;

        let active = Arc::new(AtomicBool::new(true));
        Self::spawn_bus_loop(pipeline.clone(), active.clone(), self.events.clone())?;
        *running = Some(Running { pipeline, active });
        Ok(())
    }

    fn stop(&self) {
        if let Some(running) = self.running.lock().take() {
            Self::shutdown(running);
            tracing::debug!("Player stopped");
        }
    }
}

impl Drop for PlaybinPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Clone)]
pub struct PlaybinPlayerFactory {
    video_sink: String,
}

impl PlaybinPlayerFactory {
    pub fn new(video_sink: impl Into<String>) -> Self {
        Self {
            video_sink: video_sink.into(),
        }
    }
}

impl Default for PlaybinPlayerFactory {
    fn default() -> Self {
        Self::new(DEFAULT_VIDEO_SINK)
    }
}

impl PlayerFactory for PlaybinPlayerFactory {
    fn create(&self) -> Result<(Box<dyn MediaPlayer>, mpsc::UnboundedReceiver<PlayerEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        Ok((Box::new(PlaybinPlayer::new(self.video_sink.clone(), tx)), rx))
    }
}
