mod support;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::timeout;

use async_trait::async_trait;

use live_view_client::application::services::{
    ConnectRequest, StreamSupervisor, SupervisorDeps, SupervisorSettings, SupervisorStatus,
};
use live_view_client::application::transports::TransportFactory;
use live_view_client::domain::errors::{DomainError, Result};
use live_view_client::domain::ports::{
    NoopReporter, PeerEvent, PeerState, Transport, TransportDiagnostics, TransportEvents,
};
use live_view_client::domain::value_objects::{
    CameraId, ConnectionState, LifecycleState, StreamMode,
};

use support::{camera, settle, Harness};

const WAIT: Duration = Duration::from_secs(600);

async fn wait_state(
    supervisor: &StreamSupervisor,
    predicate: impl FnMut(&ConnectionState) -> bool,
) -> ConnectionState {
    let mut rx = supervisor.subscribe();
    let state = timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("state reached in time")
        .expect("supervisor alive")
        .clone();
    state
}

async fn wait_status(
    supervisor: &StreamSupervisor,
    predicate: impl FnMut(&SupervisorStatus) -> bool,
) -> SupervisorStatus {
    let mut rx = supervisor.subscribe_status();
    let status = timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("status reached in time")
        .expect("supervisor alive")
        .clone();
    status
}

fn request(mode: StreamMode) -> ConnectRequest {
    ConnectRequest::new(camera(), mode)
}

#[tokio::test(start_paused = true)]
async fn test_realtime_connects() {
    let harness = Harness::new();
    let supervisor = harness.supervisor(SupervisorSettings::default());
    let changes = Arc::new(Mutex::new(Vec::new()));
    let seen = changes.clone();

    supervisor
        .connect(request(StreamMode::Realtime).on_connection_change(move |c| seen.lock().push(c)))
        .await
        .unwrap();

    let state = wait_state(&supervisor, |s| s.is_connected).await;
    assert_eq!(state, ConnectionState::connected(StreamMode::Realtime));
    assert_eq!(*changes.lock(), vec![true]);

    let calls = harness.backend.calls();
    assert_eq!(calls.status_checks, 1);
    assert_eq!(calls.offers.len(), 1);
    assert_eq!(calls.offers[0].0.camera_id, camera());
    assert_eq!(calls.offers[0].0.kind, "offer");
}

#[tokio::test(start_paused = true)]
async fn test_offer_failure_schedules_backoff() {
    let harness = Harness::new();
    harness.backend.script().offer_status = Some(500);
    let supervisor = harness.supervisor(SupervisorSettings::default());

    supervisor.connect(request(StreamMode::Realtime)).await.unwrap();

    let status = wait_status(&supervisor, |s| {
        matches!(s.lifecycle, LifecycleState::Reconnecting { .. })
    })
    .await;
    assert_eq!(status.lifecycle, LifecycleState::Reconnecting { attempt: 1 });
    assert_eq!(status.retry.attempt_count, 1);
    assert_eq!(status.retry.next_delay_ms, 1000);

    let state = supervisor.state();
    assert!(state.is_loading);
    assert!(!state.is_connected);
    assert!(matches!(state.error, Some(DomainError::Negotiation(_))));
    assert_eq!(harness.backend.offer_count(), 1);

    // Same mode again once the delay has elapsed
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(harness.backend.offer_count(), 2);
    assert_eq!(supervisor.status().mode, StreamMode::Realtime);
    assert_eq!(supervisor.status().retry.next_delay_ms, 2000);
}

#[tokio::test(start_paused = true)]
async fn test_backoff_grows_then_falls_back_to_segmented() {
    let harness = Harness::new();
    harness.backend.script().offer_status = Some(500);
    let supervisor = harness.supervisor(SupervisorSettings::default());

    supervisor.connect(request(StreamMode::Realtime)).await.unwrap();

    let state = wait_state(&supervisor, |s| {
        s.mode == StreamMode::SegmentedHttp && s.is_connected
    })
    .await;
    assert!(state.error.is_none());

    let times: Vec<_> = harness
        .backend
        .calls()
        .offers
        .iter()
        .map(|(_, at)| *at)
        .collect();
    assert_eq!(times.len(), 6, "one attempt plus five retries");

    let expected = [1000u64, 2000, 4000, 8000, 16000];
    for (pair, want) in times.windows(2).zip(expected) {
        let gap = (pair[1] - pair[0]).as_millis() as u64;
        assert!(gap >= want && gap < want + 500, "gap {}ms, expected {}ms", gap, want);
    }

    // No seventh realtime attempt
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(harness.backend.offer_count(), 6);
    assert_eq!(harness.backend.calls().hls_started.len(), 1);
    assert_eq!(supervisor.status().mode, StreamMode::SegmentedHttp);
}

#[tokio::test(start_paused = true)]
async fn test_connection_callback_fires_on_change_only() {
    let harness = Harness::new();
    let supervisor = harness.supervisor(SupervisorSettings::default());
    let changes = Arc::new(Mutex::new(Vec::new()));
    let seen = changes.clone();

    supervisor
        .connect(request(StreamMode::Realtime).on_connection_change(move |c| seen.lock().push(c)))
        .await
        .unwrap();
    wait_state(&supervisor, |s| s.is_connected).await;

    harness
        .peers
        .link(0)
        .emit(PeerEvent::StateChanged(PeerState::Connected));
    settle().await;
    assert_eq!(*changes.lock(), vec![true]);

    supervisor.cleanup().await.unwrap();
    assert_eq!(*changes.lock(), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_events_from_replaced_transport_are_ignored() {
    let harness = Harness::new();
    let supervisor = harness.supervisor(SupervisorSettings::default());

    supervisor.connect(request(StreamMode::Realtime)).await.unwrap();
    wait_state(&supervisor, |s| s.is_connected).await;
    let old_link = harness.peers.link(0);

    supervisor.switch_mode(StreamMode::Snapshot).await.unwrap();
    wait_state(&supervisor, |s| {
        s.mode == StreamMode::Snapshot && s.is_connected
    })
    .await;
    let generation = supervisor.status().generation;

    old_link.emit(PeerEvent::StateChanged(PeerState::Failed));
    settle().await;

    assert_eq!(supervisor.state(), ConnectionState::connected(StreamMode::Snapshot));
    assert_eq!(supervisor.status().lifecycle, LifecycleState::Connected);
    assert_eq!(supervisor.status().generation, generation);
    assert_eq!(old_link.close_count(), 1);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.backend.deleted(), vec!["rt-1"]);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_cycles_through_modes() {
    let harness = Harness::new();
    let supervisor = harness.supervisor(SupervisorSettings::default());

    supervisor.connect(request(StreamMode::Realtime)).await.unwrap();
    wait_state(&supervisor, |s| s.is_connected).await;

    for expected in [
        StreamMode::SegmentedHttp,
        StreamMode::Snapshot,
        StreamMode::Realtime,
    ] {
        supervisor.toggle_mode().await.unwrap();
        let state = wait_state(&supervisor, |s| s.mode == expected && s.is_connected).await;
        assert!(state.error.is_none());
    }

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(harness.peers.created(), 2);
    assert_eq!(harness.backend.deleted(), vec!["rt-1"]);
    assert_eq!(harness.backend.stopped(), vec!["hls-1"]);
    assert_eq!(harness.players.player(0).stops.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_inactive_camera_is_reported_without_connecting() {
    let harness = Harness::new();
    harness.backend.script().camera_active = false;
    let supervisor = harness.supervisor(SupervisorSettings::default());
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = errors.clone();

    supervisor
        .connect(request(StreamMode::Realtime).on_error(move |e| seen.lock().push(e.clone())))
        .await
        .unwrap();

    let state = wait_state(&supervisor, |s| s.error.is_some() && !s.is_loading).await;
    assert_eq!(state.error, Some(DomainError::CameraInactive(camera())));
    assert_eq!(*errors.lock(), vec![DomainError::CameraInactive(camera())]);
    assert_eq!(supervisor.status().lifecycle, LifecycleState::Failed);
    assert_eq!(harness.backend.offer_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_skipping_status_check_connects_directly() {
    let harness = Harness::new();
    harness.backend.script().camera_active = false;
    let supervisor = harness.supervisor(SupervisorSettings {
        check_camera_status: false,
        ..Default::default()
    });

    supervisor.connect(request(StreamMode::Realtime)).await.unwrap();
    wait_state(&supervisor, |s| s.is_connected).await;
    assert_eq!(harness.backend.calls().status_checks, 0);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_mid_negotiation_releases_created_session_once() {
    let harness = Harness::new();
    harness.backend.script().offer_delay = Duration::from_secs(5);
    let supervisor = harness.supervisor(SupervisorSettings::default());

    supervisor.connect(request(StreamMode::Realtime)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(harness.backend.offer_count(), 1);

    supervisor.destroy().await.unwrap();
    assert_eq!(supervisor.state(), ConnectionState::idle(StreamMode::Realtime));
    let mut rx = supervisor.subscribe();
    rx.borrow_and_update();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!rx.has_changed().unwrap_or(false));
    assert_eq!(supervisor.state(), ConnectionState::idle(StreamMode::Realtime));
    assert_eq!(harness.backend.deleted(), vec!["rt-1"]);
    assert_eq!(harness.peers.link(0).close_count(), 1);

    assert_eq!(
        supervisor.connect(request(StreamMode::Realtime)).await,
        Err(DomainError::SupervisorClosed)
    );
}

#[tokio::test(start_paused = true)]
async fn test_destroy_mid_negotiation_without_session_deletes_nothing() {
    let harness = Harness::new();
    {
        let mut script = harness.backend.script();
        script.offer_delay = Duration::from_secs(5);
        script.offer_status = Some(500);
    }
    let supervisor = harness.supervisor(SupervisorSettings::default());

    supervisor.connect(request(StreamMode::Realtime)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    supervisor.destroy().await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(harness.backend.deleted().is_empty());
    assert_eq!(supervisor.state(), ConnectionState::idle(StreamMode::Realtime));
    assert_eq!(harness.backend.offer_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_manual_reconnect_resets_attempt_budget() {
    let harness = Harness::new();
    harness.backend.script().offer_status = Some(500);
    let supervisor = harness.supervisor(SupervisorSettings::default());

    supervisor.connect(request(StreamMode::Realtime)).await.unwrap();
    let status = wait_status(&supervisor, |s| {
        s.lifecycle == LifecycleState::Reconnecting { attempt: 5 }
    })
    .await;
    assert_eq!(status.retry.next_delay_ms, 16000);
    assert_eq!(harness.backend.offer_count(), 5);

    harness.backend.script().offer_status = None;
    supervisor.reconnect().await.unwrap();
    assert_eq!(supervisor.status().retry.attempt_count, 0);
    assert_eq!(supervisor.status().mode, StreamMode::Realtime);

    // Fresh attempt right away rather than after the pending 16s delay
    settle().await;
    assert_eq!(harness.backend.offer_count(), 6);
    let state = wait_state(&supervisor, |s| s.is_connected).await;
    assert_eq!(state, ConnectionState::connected(StreamMode::Realtime));
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_exhaustion_is_terminal() {
    let harness = Harness::new();
    harness.backend.script().snapshot_failing = true;
    let supervisor = harness.supervisor(SupervisorSettings::default());
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = errors.clone();

    supervisor
        .connect(request(StreamMode::Snapshot).on_error(move |e| seen.lock().push(e.clone())))
        .await
        .unwrap();

    let state = wait_state(&supervisor, |s| s.error.is_some() && !s.is_loading).await;
    assert!(!state.is_connected);
    assert_eq!(state.mode, StreamMode::Snapshot);
    assert!(matches!(
        state.error,
        Some(DomainError::Exhausted {
            mode: StreamMode::Snapshot,
            ..
        })
    ));
    assert_eq!(errors.lock().len(), 1);
    assert_eq!(supervisor.status().lifecycle, LifecycleState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_fallback_fails_in_requested_mode() {
    let harness = Harness::new();
    harness.backend.script().offer_status = Some(500);
    let supervisor = harness.supervisor(SupervisorSettings {
        auto_fallback: false,
        ..Default::default()
    });

    supervisor.connect(request(StreamMode::Realtime)).await.unwrap();

    let state = wait_state(&supervisor, |s| s.error.is_some() && !s.is_loading).await;
    assert!(matches!(
        state.error,
        Some(DomainError::Exhausted {
            mode: StreamMode::Realtime,
            ..
        })
    ));
    assert!(harness.backend.calls().hls_started.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retry_high_quality_after_fallback() {
    let harness = Harness::new();
    harness.backend.script().offer_status = Some(500);
    let supervisor = harness.supervisor(SupervisorSettings::default());

    supervisor.connect(request(StreamMode::Realtime)).await.unwrap();
    wait_state(&supervisor, |s| {
        s.mode == StreamMode::SegmentedHttp && s.is_connected
    })
    .await;

    harness.backend.script().offer_status = None;
    supervisor.retry_high_quality().await.unwrap();

    let state = wait_state(&supervisor, |s| {
        s.mode == StreamMode::Realtime && s.is_connected
    })
    .await;
    assert!(state.error.is_none());
    assert_eq!(supervisor.status().retry.attempt_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_goes_idle_and_allows_new_connect() {
    let harness = Harness::new();
    let supervisor = harness.supervisor(SupervisorSettings::default());

    supervisor.connect(request(StreamMode::Realtime)).await.unwrap();
    wait_state(&supervisor, |s| s.is_connected).await;

    supervisor.cleanup().await.unwrap();
    assert_eq!(supervisor.state(), ConnectionState::idle(StreamMode::Realtime));
    assert_eq!(supervisor.status().camera_id, None);
    assert_eq!(supervisor.diagnostics().await.unwrap(), None);
    assert_eq!(supervisor.reconnect().await, Err(DomainError::NoCamera));

    supervisor.connect(request(StreamMode::Realtime)).await.unwrap();
    wait_state(&supervisor, |s| s.is_connected).await;
    assert_eq!(harness.peers.created(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_diagnostics_describe_active_transport() {
    let harness = Harness::new();
    let supervisor = harness.supervisor(SupervisorSettings::default());

    supervisor.connect(request(StreamMode::Realtime)).await.unwrap();
    wait_state(&supervisor, |s| s.is_connected).await;
    settle().await;

    let diagnostics = supervisor.diagnostics().await.unwrap().unwrap();
    assert_eq!(diagnostics.mode, StreamMode::Realtime);
    assert_eq!(diagnostics.session_id.as_deref(), Some("rt-1"));
    assert_eq!(diagnostics.peer_state.as_deref(), Some("connected"));
    assert!(!diagnostics.destroyed);
}

/// Connects at once and hands its event sink to the test
#[derive(Default)]
struct ManualTransports {
    sinks: Mutex<Vec<TransportEvents>>,
}

impl ManualTransports {
    fn latest(&self) -> TransportEvents {
        self.sinks.lock().last().cloned().expect("a transport was connected")
    }

    fn built(&self) -> usize {
        self.sinks.lock().len()
    }
}

struct ManualTransport {
    mode: StreamMode,
    owner: Arc<ManualTransports>,
}

#[async_trait]
impl Transport for ManualTransport {
    fn mode(&self) -> StreamMode {
        self.mode
    }

    async fn connect(&self, _camera_id: CameraId, events: TransportEvents) -> Result<()> {
        events.on_connected();
        self.owner.sinks.lock().push(events);
        Ok(())
    }

    async fn cleanup(&self) {}

    fn diagnostics(&self) -> TransportDiagnostics {
        TransportDiagnostics {
            mode: self.mode,
            ..Default::default()
        }
    }
}

struct ManualFactory(Arc<ManualTransports>);

impl TransportFactory for ManualFactory {
    fn build(&self, mode: StreamMode) -> Arc<dyn Transport> {
        Arc::new(ManualTransport {
            mode,
            owner: self.0.clone(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_only_fatal_errors_spend_retry_budget() {
    let harness = Harness::new();
    let transports = Arc::new(ManualTransports::default());
    let supervisor = StreamSupervisor::new(
        SupervisorDeps {
            factory: Arc::new(ManualFactory(transports.clone())),
            backend: harness.backend.clone(),
            metrics: Arc::new(NoopReporter),
        },
        SupervisorSettings::default(),
    );

    supervisor.connect(request(StreamMode::Realtime)).await.unwrap();
    wait_state(&supervisor, |s| s.is_connected).await;

    let events = transports.latest();
    events.on_error(DomainError::Relay("candidate rejected".into()));
    events.on_error(DomainError::KeepAlive("404".into()));
    events.on_error(DomainError::Decode("truncated".into()));
    events.on_error(DomainError::ConnectInFlight);
    settle().await;

    let status = supervisor.status();
    assert_eq!(status.lifecycle, LifecycleState::Connected);
    assert_eq!(status.retry.attempt_count, 0);
    assert_eq!(supervisor.state(), ConnectionState::connected(StreamMode::Realtime));
    assert_eq!(transports.built(), 1);

    events.on_error(DomainError::TransportState("peer connection failed".into()));
    let status = wait_status(&supervisor, |s| {
        matches!(s.lifecycle, LifecycleState::Reconnecting { .. })
    })
    .await;
    assert_eq!(status.retry.attempt_count, 1);
}
