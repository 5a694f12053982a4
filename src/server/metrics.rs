use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all Cratedigger metrics
const PREFIX: &str = "cratedigger";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Match search
    pub static ref SEARCH_ATTEMPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_search_attempts_total"), "Match search attempts by outcome"),
        &["outcome"]
    ).expect("Failed to create search_attempts_total metric");

    // Download jobs
    pub static ref DOWNLOAD_JOBS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_download_jobs_total"), "Finished download jobs by outcome"),
        &["outcome"]
    ).expect("Failed to create download_jobs_total metric");

    pub static ref DOWNLOAD_JOBS_ACTIVE: Gauge = Gauge::new(
        format!("{PREFIX}_download_jobs_active"),
        "Download jobs currently holding a worker slot"
    ).expect("Failed to create download_jobs_active metric");

    pub static ref LIBRARY_ITEMS_TOTAL: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_library_items_total"), "Rows in the track store"),
        &["type"]
    ).expect("Failed to create library_items_total metric");

    // Error Metrics
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_errors_total"), "Total errors by type and endpoint"),
        &["error_type", "endpoint"]
    ).expect("Failed to create errors_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(SEARCH_ATTEMPTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(DOWNLOAD_JOBS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(DOWNLOAD_JOBS_ACTIVE.clone()));
    let _ = REGISTRY.register(Box::new(LIBRARY_ITEMS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ERRORS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_search_attempt(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    SEARCH_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn download_job_started() {
    DOWNLOAD_JOBS_ACTIVE.inc();
}

/// Record the end of a job that previously called [`download_job_started`].
pub fn download_job_finished(outcome: &str) {
    DOWNLOAD_JOBS_ACTIVE.dec();
    DOWNLOAD_JOBS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn set_library_items(primary_tracks: usize, saved_tracks: usize, playlists: usize) {
    LIBRARY_ITEMS_TOTAL
        .with_label_values(&["primary_track"])
        .set(primary_tracks as f64);
    LIBRARY_ITEMS_TOTAL
        .with_label_values(&["saved_track"])
        .set(saved_tracks as f64);
    LIBRARY_ITEMS_TOTAL
        .with_label_values(&["playlist"])
        .set(playlists as f64);
}

/// Record an error
pub fn record_error(error_type: &str, endpoint: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, endpoint])
        .inc();
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
