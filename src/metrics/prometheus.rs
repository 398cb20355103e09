//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Failures to build the desired configuration from local inputs
    pub static ref CONFIG_LOAD_ERRORS: CounterVec = register_counter_vec!(
        "webhook_config_controller_config_load_errors_total",
        "Total number of failures to load the webhook configuration from local files",
        &["reason"]
    ).unwrap();

    /// Failed deletes of the webhook configuration
    pub static ref DELETE_ERRORS: CounterVec = register_counter_vec!(
        "webhook_config_controller_delete_errors_total",
        "Total number of failed webhook configuration deletes",
        &["reason"]
    ).unwrap();

    /// Failed creates/updates of the webhook configuration
    pub static ref UPDATE_ERRORS: CounterVec = register_counter_vec!(
        "webhook_config_controller_update_errors_total",
        "Total number of failed webhook configuration creates or updates",
        &["reason"]
    ).unwrap();

    /// Successful convergence passes
    pub static ref UPDATES: Counter = register_counter!(
        "webhook_config_controller_updates_total",
        "Total number of successful webhook configuration reconciliations"
    ).unwrap();

    /// Total number of reconciliations
    pub static ref RECONCILIATIONS: Counter = register_counter!(
        "webhook_config_controller_reconciliations_total",
        "Total number of reconciliations"
    ).unwrap();

    /// Reconciliations that returned a retryable error
    pub static ref RECONCILIATION_ERRORS: Counter = register_counter!(
        "webhook_config_controller_reconciliation_errors_total",
        "Total number of reconciliations that will be retried"
    ).unwrap();

    /// Reconciliation duration histogram
    pub static ref RECONCILE_DURATION: Histogram = register_histogram!(
        "webhook_config_controller_reconcile_duration_seconds",
        "Duration of reconciliations in seconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// 1 once every local object cache has completed its initial sync
    pub static ref CACHES_SYNCED: Gauge = register_gauge!(
        "webhook_config_controller_caches_synced",
        "Whether the local object caches have completed their initial sync"
    ).unwrap();

    /// Controller health (1 = healthy, 0 = unhealthy)
    pub static ref CONTROLLER_HEALTH: Gauge = register_gauge!(
        "webhook_config_controller_health",
        "Controller health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

pub fn report_config_load_error(reason: &str) {
    CONFIG_LOAD_ERRORS.with_label_values(&[reason]).inc();
}

pub fn report_delete_error(reason: &str) {
    DELETE_ERRORS.with_label_values(&[reason]).inc();
}

pub fn report_update_error(reason: &str) {
    UPDATE_ERRORS.with_label_values(&[reason]).inc();
}

pub fn report_update() {
    UPDATES.inc();
}

/// Start the metrics HTTP server
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    CONTROLLER_HEALTH.set(1.0);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match req.uri().path() {
        "/metrics" => metrics_response(),
        "/healthz" | "/health" => text_response(StatusCode::OK, "ok"),
        "/readyz" | "/ready" => ready_response(),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

/// Generate metrics response
fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(content_type) = encoder.format_type().parse() {
        response
            .headers_mut()
            .insert(hyper::header::CONTENT_TYPE, content_type);
    }
    response
}

/// Ready once the caches have synced and the worker is running
fn ready_response() -> Response<Full<Bytes>> {
    if CACHES_SYNCED.get() >= 1.0 {
        text_response(StatusCode::OK, "ok")
    } else {
        text_response(StatusCode::SERVICE_UNAVAILABLE, "caches not synced")
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}
