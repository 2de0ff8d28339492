use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Metric name prefix for all analytics-server metrics
const PREFIX: &str = "harmonia_analytics";

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

    // Event Tracking Metrics
    pub static ref PLAY_EVENTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_play_events_total"), "Play events recorded"),
        &["attribution"]
    ).expect("Failed to create play_events_total metric");

    pub static ref ENGAGEMENT_EVENTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_engagement_events_total"), "Engagement events recorded"),
        &["type"]
    ).expect("Failed to create engagement_events_total metric");

    // Background Refresh Metrics
    pub static ref REFRESH_TASKS_DROPPED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            format!("{PREFIX}_refresh_tasks_dropped_total"),
            "Aggregate refresh tasks dropped instead of queued"
        ),
        &["reason"]
    ).expect("Failed to create refresh_tasks_dropped_total metric");

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
    let _ = REGISTRY.register(Box::new(PLAY_EVENTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ENGAGEMENT_EVENTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(REFRESH_TASKS_DROPPED_TOTAL.clone()));
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

/// Record a tracked play, labelled "authenticated" or "anonymous"
pub fn record_play_event(attribution: &str) {
    PLAY_EVENTS_TOTAL.with_label_values(&[attribution]).inc();
}

/// Record a tracked engagement by type
pub fn record_engagement_event(engagement_type: &str) {
    ENGAGEMENT_EVENTS_TOTAL
        .with_label_values(&[engagement_type])
        .inc();
}

/// Record a refresh task that was dropped ("full" or "closed")
pub fn record_refresh_drop(reason: &str) {
    REFRESH_TASKS_DROPPED_TOTAL
        .with_label_values(&[reason])
        .inc();
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
