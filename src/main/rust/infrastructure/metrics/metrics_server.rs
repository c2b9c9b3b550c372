use tokio::sync::watch;
use warp::Filter;

use super::PrometheusReporter;
use crate::domain::value_objects::ConnectionState;

/// Health check response structure
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

const SERVICE: &str = "live-view-client";

/// Metrics, probes and the live connection state as JSON
pub fn routes(
    state: watch::Receiver<ConnectionState>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    // CORS configuration for browser access
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let metrics_route = warp::path("metrics").map(|| {
        let body = PrometheusReporter::gather_metrics();
        warp::reply::with_header(body, "content-type", "text/plain; version=0.0.4; charset=utf-8")
    });

    let health_route = warp::path("health").map(|| {
        let response = HealthResponse {
            status: "healthy",
            service: SERVICE,
            version: env!("CARGO_PKG_VERSION"),
        };
        warp::reply::json(&response)
    });

    let liveness_route =
        warp::path("livez").map(|| warp::reply::with_status("OK", warp::http::StatusCode::OK));

    // Ready once some transport delivers video
    let ready_state = state.clone();
    let readiness_route = warp::path("readyz").map(move || {
        let connected = ready_state.borrow().is_connected;
        let (status, code) = if connected {
            ("ready", warp::http::StatusCode::OK)
        } else {
            ("not_ready", warp::http::StatusCode::SERVICE_UNAVAILABLE)
        };
        let response = HealthResponse {
            status,
            service: SERVICE,
            version: env!("CARGO_PKG_VERSION"),
        };
        warp::reply::with_status(warp::reply::json(&response), code)
    });

    let status_route = warp::path("status").map(move || {
        let snapshot = state.borrow().clone();
        warp::reply::json(&snapshot)
    });

    metrics_route
        .or(health_route)
        .or(liveness_route)
        .or(readiness_route)
        .or(status_route)
        .with(cors)
}

pub async fn serve_metrics(port: u16, state: watch::Receiver<ConnectionState>) {
    tracing::info!("Metrics server starting on port {}", port);

    warp::serve(routes(state)).run(([0, 0, 0, 0], port)).await;
}
