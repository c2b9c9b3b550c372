use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use live_view_client::{
    serve_metrics, Config, ConnectRequest, FrameFileSink, HttpStreamingBackend, PlaybackSurfaces,
    PlaybinPlayerFactory, PortTransportFactory, PrometheusReporter, StreamSupervisor,
    SurfaceArbiter, SupervisorDeps, TrackStatsSink, TransportContext, TransportPorts,
    TungsteniteSnapshotConnector, WebRtcPeerConnector,
};

const SHUTDOWN_DRAIN: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration
    let config = Config::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if config.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!("Starting live-view v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {:?}", config);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(e);
    }

    // Playlists are rendered through GStreamer
    gstreamer::init()?;
    info!("GStreamer initialized");

    PrometheusReporter::init_metrics()?;
    info!("Metrics initialized");

    let backend_config = config.to_backend_config()?;
    let timings = config.to_timings()?;
    let release_grace = timings.release_grace();
    let settings = config.to_settings()?;

    // Create infrastructure implementations (dependency injection)
    let backend = Arc::new(HttpStreamingBackend::new(backend_config.clone())?);
    let metrics = Arc::new(PrometheusReporter::new());
    let surfaces = PlaybackSurfaces::new(
        Arc::new(TrackStatsSink::new()),
        Arc::new(FrameFileSink::new(config.frame_output.clone())),
    );
    let ctx = TransportContext {
        backend: backend.clone(),
        backend_config: backend_config.clone(),
        surfaces: SurfaceArbiter::new(surfaces),
        timings,
        metrics: metrics.clone(),
    };
    let ports = TransportPorts {
        peers: Arc::new(WebRtcPeerConnector::new()),
        players: Arc::new(PlaybinPlayerFactory::new(config.video_sink.clone())),
        sockets: Arc::new(TungsteniteSnapshotConnector::new(backend_config)),
    };

    let supervisor = StreamSupervisor::new(
        SupervisorDeps {
            factory: Arc::new(PortTransportFactory::new(ctx, ports)),
            backend,
            metrics,
        },
        settings,
    );

    // Start metrics server
    let metrics_port = config.metrics_port;
    let state_rx = supervisor.subscribe();
    tokio::spawn(async move {
        serve_metrics(metrics_port, state_rx).await;
    });

    // Log every published view state
    let mut changes = supervisor.subscribe();
    tokio::spawn(async move {
        while changes.changed().await.is_ok() {
            let state = changes.borrow_and_update().clone();
            match &state.error {
                Some(err) if !state.is_loading => warn!(mode = %state.mode, "Stream failed: {}", err),
                Some(err) => info!(mode = %state.mode, "Retrying after: {}", err),
                None => info!(
                    mode = %state.mode,
                    connected = state.is_connected,
                    loading = state.is_loading,
                    "Connection state changed"
                ),
            }
        }
    });

    let request = ConnectRequest::new(config.camera(), config.mode)
        .on_connection_change(|connected| info!(connected, "Connection changed"))
        .on_error(|err| error!("Live view gave up: {}", err));
    supervisor
        .connect(request)
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    info!("-------------------------------------------------------");
    info!("Live View Running");
    info!("   Backend: {}", config.api_url);
    info!("   Camera:  {}", config.camera_id);
    info!("   Mode:    {}", config.mode);
    info!("   Metrics: http://0.0.0.0:{}/metrics", config.metrics_port);
    info!("   Status:  http://0.0.0.0:{}/status", config.metrics_port);
    info!("-------------------------------------------------------");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received (Ctrl+C)"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }

    // Graceful shutdown releases backend sessions
    if let Err(e) = supervisor.destroy().await {
        warn!("Supervisor shutdown: {}", e);
    }
    // Releases run after the grace delay; give them time to reach the backend
    tokio::time::sleep(release_grace + SHUTDOWN_DRAIN).await;

    info!("Client stopped gracefully");
    Ok(())
}
