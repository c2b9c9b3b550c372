use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::application::transports::TransportFactory;
use crate::domain::entities::{
    ConnectionChangeFilter, ConnectionLifecycle, FailureOutcome, FallbackSelector,
};
use crate::domain::errors::{DomainError, ErrorClass, Result};
use crate::domain::ports::{
    CameraStatus, MetricsReporter, StreamingBackend, Transport, TransportDiagnostics,
    TransportEvents, TransportNotice, TransportSignal,
};
use crate::domain::value_objects::{
    BackoffPolicy, CameraId, ConnectionState, LifecycleState, RetryState, StreamMode,
};

pub type ConnectionCallback = Box<dyn Fn(bool) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&DomainError) + Send + Sync>;

/// What a view asks for when it mounts
pub struct ConnectRequest {
    pub camera_id: CameraId,
    pub mode: StreamMode,
    pub on_connection_change: Option<ConnectionCallback>,
    pub on_error: Option<ErrorCallback>,
}

impl ConnectRequest {
    pub fn new(camera_id: CameraId, mode: StreamMode) -> Self {
        Self {
            camera_id,
            mode,
            on_connection_change: None,
            on_error: None,
        }
    }

    pub fn on_connection_change(mut self, callback: impl Fn(bool) + Send + Sync + 'static) -> Self {
        self.on_connection_change = Some(Box::new(callback));
        self
    }

    pub fn on_error(mut self, callback: impl Fn(&DomainError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(callback));
        self
    }
}

/// Collaborators injected by whoever owns the supervisor
#[derive(Clone)]
pub struct SupervisorDeps {
    pub factory: Arc<dyn TransportFactory>,
    pub backend: Arc<dyn StreamingBackend>,
    pub metrics: Arc<dyn MetricsReporter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorSettings {
    pub backoff: BackoffPolicy,
    /// Demote to the next mode when one is exhausted instead of failing
    pub auto_fallback: bool,
    /// Consult `/cameras/{id}/status` before the first connect
    pub check_camera_status: bool,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            auto_fallback: true,
            check_camera_status: true,
        }
    }
}

/// Internal bookkeeping, published next to the view state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorStatus {
    pub lifecycle: LifecycleState,
    pub retry: RetryState,
    pub mode: StreamMode,
    pub generation: u64,
    pub camera_id: Option<CameraId>,
}

type Reply = oneshot::Sender<Result<()>>;

enum Command {
    Connect(ConnectRequest, Reply),
    ToggleMode(Reply),
    SwitchMode(StreamMode, Reply),
    Reconnect(Reply),
    RetryHighQuality(Reply),
    Refresh(Reply),
    Cleanup(Reply),
    Destroy(Reply),
    Diagnostics(oneshot::Sender<Option<TransportDiagnostics>>),
}

enum Internal {
    RetryDue {
        generation: u64,
    },
    StatusChecked {
        generation: u64,
        result: Result<CameraStatus>,
    },
    ConnectFinished {
        generation: u64,
        result: Result<()>,
    },
}

/// Owns the single active transport of one camera view.
///
/// All state lives in an actor task; this handle only sends commands and
/// reads the published watch channels. Dropping every handle tears the
/// active transport down.
#[derive(Clone)]
pub struct StreamSupervisor {
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    status_rx: watch::Receiver<SupervisorStatus>,
}

impl StreamSupervisor {
    /// Spawn the supervisor actor on the current tokio runtime
    pub fn new(deps: SupervisorDeps, settings: SupervisorSettings) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let mode = StreamMode::default();
        let lifecycle = ConnectionLifecycle::new();
        let (state_tx, state_rx) = watch::channel(ConnectionState::idle(mode));
        let (status_tx, status_rx) = watch::channel(SupervisorStatus {
            lifecycle: *lifecycle.current_state(),
            retry: lifecycle.retry_state(),
            mode,
            generation: 0,
            camera_id: None,
        });

        let mut filter = ConnectionChangeFilter::new();
        filter.accept(false);

        let actor = SupervisorActor {
            deps,
            settings,
            lifecycle,
            selector: FallbackSelector::new(),
            filter,
            generation: 0,
            camera_id: None,
            mode,
            active: None,
            retry_timer: None,
            on_connection_change: None,
            on_error: None,
            state_tx,
            status_tx,
            notices_tx,
            internal_tx,
        };
        tokio::spawn(actor.run(commands_rx, notices_rx, internal_rx));

        Self {
            commands: commands_tx,
            state_rx,
            status_rx,
        }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| DomainError::SupervisorClosed)?;
        rx.await.map_err(|_| DomainError::SupervisorClosed)
    }

    /// Start streaming a camera. Returns once the attempt is under way;
    /// progress is published through [`subscribe`](Self::subscribe).
    pub async fn connect(&self, request: ConnectRequest) -> Result<()> {
        self.request(|reply| Command::Connect(request, reply)).await?
    }

    /// Tear down and reconnect in the next mode of the cycle
    pub async fn toggle_mode(&self) -> Result<()> {
        self.request(Command::ToggleMode).await?
    }

    pub async fn switch_mode(&self, mode: StreamMode) -> Result<()> {
        self.request(|reply| Command::SwitchMode(mode, reply)).await?
    }

    /// Manual retry of the current mode with a fresh attempt budget
    pub async fn reconnect(&self) -> Result<()> {
        self.request(Command::Reconnect).await?
    }

    /// Forget failed modes and start again at realtime
    pub async fn retry_high_quality(&self) -> Result<()> {
        self.request(Command::RetryHighQuality).await?
    }

    pub async fn refresh(&self) -> Result<()> {
        self.request(Command::Refresh).await?
    }

    /// Tear down the active transport and go idle; the supervisor stays usable
    pub async fn cleanup(&self) -> Result<()> {
        self.request(Command::Cleanup).await?
    }

    /// Tear down and stop the actor. Later calls fail with `SupervisorClosed`.
    pub async fn destroy(&self) -> Result<()> {
        self.request(Command::Destroy).await?
    }

    pub async fn diagnostics(&self) -> Result<Option<TransportDiagnostics>> {
        self.request(Command::Diagnostics).await
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SupervisorStatus> {
        self.status_rx.clone()
    }

    pub fn status(&self) -> SupervisorStatus {
        self.status_rx.borrow().clone()
    }
}

struct ActiveTransport {
    transport: Arc<dyn Transport>,
    events: TransportEvents,
}

struct SupervisorActor {
    deps: SupervisorDeps,
    settings: SupervisorSettings,
    lifecycle: ConnectionLifecycle,
    selector: FallbackSelector,
    filter: ConnectionChangeFilter,
    generation: u64,
    camera_id: Option<CameraId>,
    mode: StreamMode,
    active: Option<ActiveTransport>,
    retry_timer: Option<JoinHandle<()>>,
    on_connection_change: Option<ConnectionCallback>,
    on_error: Option<ErrorCallback>,
    state_tx: watch::Sender<ConnectionState>,
    status_tx: watch::Sender<SupervisorStatus>,
    notices_tx: mpsc::UnboundedSender<TransportNotice>,
    internal_tx: mpsc::UnboundedSender<Internal>,
}

impl SupervisorActor {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut notices: mpsc::UnboundedReceiver<TransportNotice>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
    ) {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        self.go_idle("supervisor dropped").await;
                        break;
                    }
                },
                Some(notice) = notices.recv() => self.handle_notice(notice).await,
                Some(message) = internal.recv() => self.handle_internal(message).await,
            }
        }
        tracing::debug!("Supervisor stopped");
    }

    /// Returns false once the actor should stop
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect(request, reply) => {
                let _ = reply.send(self.connect(request).await);
            }
            Command::ToggleMode(reply) => {
                let next = self.mode.toggled();
                let _ = reply.send(self.restart_in(next, "mode toggled").await);
            }
            Command::SwitchMode(mode, reply) => {
                let _ = reply.send(self.restart_in(mode, "mode switched").await);
            }
            Command::Reconnect(reply) => {
                let mode = self.mode;
                let _ = reply.send(self.restart_in(mode, "manual reconnect").await);
            }
            Command::RetryHighQuality(reply) => {
                let mode = self.selector.reset();
                let _ = reply.send(self.restart_in(mode, "retry high quality").await);
            }
            Command::Refresh(reply) => {
                let result = match self.active.as_ref() {
                    Some(active) => active.transport.refresh().await,
                    None => Ok(()),
                };
                let _ = reply.send(result);
            }
            Command::Cleanup(reply) => {
                self.go_idle("cleanup").await;
                let _ = reply.send(Ok(()));
            }
            Command::Diagnostics(reply) => {
                let _ = reply.send(self.active.as_ref().map(|a| a.transport.diagnostics()));
            }
            Command::Destroy(reply) => {
                self.go_idle("destroyed").await;
                let _ = reply.send(Ok(()));
                return false;
            }
        }
        true
    }

    async fn connect(&mut self, request: ConnectRequest) -> Result<()> {
        self.teardown().await;

        let camera_id = request.camera_id;
        self.camera_id = Some(camera_id);
        self.mode = request.mode;
        self.on_connection_change = request.on_connection_change;
        self.on_error = request.on_error;
        self.selector = FallbackSelector::new();
        self.lifecycle.reset_retries();
        tracing::info!(%camera_id, mode = %self.mode, "Connecting camera view");

        if self.settings.check_camera_status {
            self.check_camera_status(camera_id);
        } else {
            self.start_instance(None);
        }
        Ok(())
    }

    fn check_camera_status(&mut self, camera_id: CameraId) {
        self.generation += 1;
        let generation = self.generation;
        self.lifecycle.transition_to_connecting();
        self.publish(ConnectionState::loading(self.mode));

        let backend = self.deps.backend.clone();
        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = backend.camera_status(camera_id).await;
            let _ = internal.send(Internal::StatusChecked { generation, result });
        });
    }

    /// Tear down, then start over in `mode` with a fresh retry budget
    async fn restart_in(&mut self, mode: StreamMode, reason: &str) -> Result<()> {
        if self.camera_id.is_none() {
            return Err(DomainError::NoCamera);
        }
        self.teardown().await;
        self.lifecycle.transition_to_idle(Some(reason.to_string()));

        if mode != self.mode {
            tracing::info!(from = %self.mode, to = %mode, "{}", reason);
        } else {
            tracing::info!(%mode, "{}", reason);
        }
        self.mode = mode;
        self.lifecycle.reset_retries();
        self.start_instance(None);
        Ok(())
    }

    /// Build and connect a new transport for the current (camera, mode)
    fn start_instance(&mut self, visible_error: Option<DomainError>) {
        let Some(camera_id) = self.camera_id else {
            return;
        };
        self.generation += 1;
        let generation = self.generation;
        let mode = self.mode;

        if !matches!(self.lifecycle.current_state(), LifecycleState::Connecting) {
            self.lifecycle.transition_to_connecting();
        }
        self.publish(match visible_error {
            Some(err) => ConnectionState::retrying(mode, err),
            None => ConnectionState::loading(mode),
        });

        let transport = self.deps.factory.build(mode);
        let events = TransportEvents::new(generation, mode, self.notices_tx.clone());
        self.active = Some(ActiveTransport {
            transport: transport.clone(),
            events: events.clone(),
        });
        tracing::info!(%camera_id, %mode, generation, "Starting transport");

        let internal = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = transport.connect(camera_id, events).await;
            let _ = internal.send(Internal::ConnectFinished { generation, result });
        });
    }

    /// Stop timers and destroy the active transport. Late events from it are dropped.
    async fn teardown(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
        self.generation += 1;

        if let Some(active) = self.active.take() {
            active.events.revoke();
            active.transport.cleanup().await;
            tracing::debug!(mode = %active.transport.mode(), "Transport destroyed");
        }
    }

    async fn go_idle(&mut self, reason: &str) {
        self.teardown().await;
        if !matches!(self.lifecycle.current_state(), LifecycleState::Idle) {
            self.lifecycle.transition_to_idle(Some(reason.to_string()));
            tracing::info!(camera_id = ?self.camera_id, "Camera view idle: {}", reason);
        }
        self.camera_id = None;
        self.publish(ConnectionState::idle(self.mode));
    }

    async fn handle_notice(&mut self, notice: TransportNotice) {
        if notice.generation != self.generation || self.active.is_none() {
            tracing::trace!(
                generation = notice.generation,
                current = self.generation,
                "Dropping stale transport event"
            );
            return;
        }

        match notice.signal {
            TransportSignal::Connected => {
                if !self.lifecycle.current_state().is_connected() {
                    self.lifecycle.transition_to_connected();
                    tracing::info!(camera_id = ?self.camera_id, mode = %self.mode, "Stream connected");
                }
                self.publish(ConnectionState::connected(self.mode));
            }
            TransportSignal::Degraded(detail) => {
                tracing::warn!(mode = %self.mode, "Transport degraded: {}", detail);
            }
            TransportSignal::Error(err) => self.on_failure(err).await,
        }
    }

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::RetryDue { generation } => {
                if generation != self.generation {
                    return;
                }
                self.retry_timer = None;
                if let LifecycleState::Reconnecting { attempt } = *self.lifecycle.current_state() {
                    tracing::info!(mode = %self.mode, attempt, "Reconnecting");
                    let shown = self.state_tx.borrow().error.clone();
                    self.start_instance(shown);
                }
            }
            Internal::StatusChecked { generation, result } => {
                if generation != self.generation {
                    return;
                }
                match result {
                    Ok(status) if !status.active => {
                        let err = DomainError::CameraInactive(CameraId::new(status.camera_id));
                        tracing::warn!(camera_id = status.camera_id, "Camera inactive, not connecting");
                        self.lifecycle.transition_to_failed(Some(err.to_string()));
                        self.fail_terminally(err);
                    }
                    Ok(_) => self.start_instance(None),
                    Err(e) => {
                        tracing::warn!("Camera status check failed, connecting anyway: {}", e);
                        self.start_instance(None);
                    }
                }
            }
            Internal::ConnectFinished { generation, result } => {
                if generation != self.generation {
                    return;
                }
                if let Err(err) = result {
                    self.on_failure(err).await;
                }
            }
        }
    }

    async fn on_failure(&mut self, err: DomainError) {
        let mode = self.mode;
        match err.class() {
            ErrorClass::Fatal => {}
            ErrorClass::Transient | ErrorClass::NonFatal => {
                tracing::warn!(%mode, "Transport reported a recoverable error: {}", err);
                return;
            }
            ErrorClass::Rejected => {
                tracing::debug!(%mode, "Ignoring rejected transport operation: {}", err);
                return;
            }
        }

        match self
            .lifecycle
            .record_failure(&self.settings.backoff, err.to_string())
        {
            FailureOutcome::Ignored => {
                tracing::debug!(%mode, "Failure ignored in current state: {}", err);
            }
            FailureOutcome::Retry { attempt, delay } => {
                tracing::warn!(
                    %mode,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Transport failed, reconnecting: {}",
                    err
                );
                self.teardown().await;
                self.deps.metrics.report_reconnect_attempt(mode);
                self.deps.metrics.report_backoff(delay.as_secs_f64());
                self.publish(ConnectionState::retrying(mode, err));
                self.schedule_retry(delay);
            }
            FailureOutcome::Exhausted => {
                self.teardown().await;
                if self.settings.auto_fallback && !self.selector.is_terminal(mode) {
                    let next = self.selector.next_after_exhaustion(mode);
                    tracing::warn!(from = %mode, to = %next, "Mode exhausted, falling back: {}", err);
                    self.deps.metrics.report_fallback(mode, next);
                    self.mode = next;
                    self.lifecycle.reset_retries();
                    self.start_instance(None);
                } else {
                    tracing::error!(%mode, "Stream failed, retries exhausted: {}", err);
                    self.fail_terminally(DomainError::Exhausted {
                        mode,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    fn fail_terminally(&mut self, err: DomainError) {
        self.publish(ConnectionState::failed(self.mode, err.clone()));
        if let Some(callback) = self.on_error.as_ref() {
            callback(&err);
        }
    }

    fn schedule_retry(&mut self, delay: Duration) {
        let generation = self.generation;
        let internal = self.internal_tx.clone();
        self.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = internal.send(Internal::RetryDue { generation });
        }));
    }

    fn publish(&mut self, state: ConnectionState) {
        let connected = state.is_connected;
        self.state_tx.send_replace(state);

        if self.filter.accept(connected) {
            if let Some(callback) = self.on_connection_change.as_ref() {
                callback(connected);
            }
        }
        self.report_status();
    }

    fn report_status(&self) {
        let lifecycle = *self.lifecycle.current_state();
        let status = SupervisorStatus {
            lifecycle,
            retry: self.lifecycle.retry_state(),
            mode: self.mode,
            generation: self.generation,
            camera_id: self.camera_id,
        };
        self.status_tx.send_replace(status);

        let metrics = &self.deps.metrics;
        metrics.report_lifecycle(&lifecycle);
        metrics.report_mode(self.mode);
        metrics.report_connected(lifecycle.is_connected());
    }
}
