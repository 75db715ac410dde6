use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder, HistogramVec,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Persistence Metrics (MongoDB, Redis, local files)
    pub static ref DB_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_operations_total",
        "Total number of database operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref DB_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_operation_duration_seconds",
        "Database operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    pub static ref STORAGE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "storage_operations_total",
        "Total number of local attempt storage operations",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref STORAGE_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "storage_operation_duration_seconds",
        "Local attempt storage operation duration in seconds",
        &["operation"],
        vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1]
    )
    .unwrap();

    // Quiz Metrics
    pub static ref SESSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "sessions_total",
        "Total number of quiz sessions",
        &["status"]
    )
    .unwrap();

    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "sessions_active",
        "Number of quiz sessions in progress"
    )
    .unwrap();

    pub static ref ANSWERS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "answers_submitted_total",
        "Total number of answers submitted",
        &["correct"]
    )
    .unwrap();

    pub static ref ATTEMPT_WRITE_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "attempt_write_failures_total",
        "Attempt writes that failed and left the question unanswered",
        &["backend"]
    )
    .unwrap();

    pub static ref TROPHIES_UNLOCKED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "trophies_unlocked_total",
        "Total number of trophies unlocked",
        &["trophy"]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track database operation with metrics
pub async fn track_db_operation<F, T>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    DB_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    DB_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

/// Helper: track a keyed-store read or write (file or Redis backed)
pub async fn track_storage_operation<F, T>(operation: &str, future: F) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    STORAGE_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();

    STORAGE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration);

    result
}
