use once_cell::sync::Lazy;
use prometheus::{
    opts, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};

macro_rules! counter_vec {
    ($name:expr, $help:expr, $labels:expr) => {
        Lazy::new(|| IntCounterVec::new(opts!($name, $help), $labels).unwrap())
    };
}
macro_rules! histogram_vec {
    ($name:expr, $help:expr, $labels:expr) => {
        Lazy::new(|| {
            HistogramVec::new(HistogramOpts::new($name, $help).buckets(LATENCY_BUCKETS.to_vec()), $labels)
                .unwrap()
        })
    };
}
macro_rules! counter {
    ($name:expr, $help:expr) => {
        Lazy::new(|| IntCounter::new($name, $help).unwrap())
    };
}
macro_rules! gauge {
    ($name:expr, $help:expr) => {
        Lazy::new(|| IntGauge::new($name, $help).unwrap())
    };
}

const LATENCY_BUCKETS: [f64; 11] = [
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

// ── HTTP ────────────────────────────────────────────────────────────────────
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> =
    counter_vec!("http_requests_total", "Total HTTP requests", &["method", "path", "status"]);
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> =
    histogram_vec!("http_request_duration_seconds", "HTTP request latency", &["method", "path"]);

// ── Validation ──────────────────────────────────────────────────────────────
pub static VALIDATION_RUNS_TOTAL: Lazy<IntCounterVec> =
    counter_vec!("validation_runs_total", "Pipeline runs per endpoint", &["endpoint"]);
pub static VALIDATION_FAILURES_TOTAL: Lazy<IntCounterVec> =
    counter_vec!("validation_failures_total", "Rejected requests per endpoint", &["endpoint"]);
pub static RATE_LIMIT_REJECTIONS_TOTAL: Lazy<IntCounterVec> =
    counter_vec!("rate_limit_rejections_total", "Requests over an attempt threshold", &["action"]);
pub static DEPENDENCY_FAILURES_TOTAL: Lazy<IntCounterVec> =
    counter_vec!("dependency_failures_total", "Collaborator lookups that failed", &["service"]);
pub static BREACHED_PASSWORDS_TOTAL: Lazy<IntCounter> =
    counter!("breached_passwords_total", "Passwords found in the breach corpus");

// ── Process ─────────────────────────────────────────────────────────────────
pub static PROCESS_START_TIME: Lazy<IntGauge> =
    gauge!("process_start_time_seconds", "Unix time the process started");

pub fn register_all(r: &Registry) -> prometheus::Result<()> {
    r.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    r.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;
    r.register(Box::new(VALIDATION_RUNS_TOTAL.clone()))?;
    r.register(Box::new(VALIDATION_FAILURES_TOTAL.clone()))?;
    r.register(Box::new(RATE_LIMIT_REJECTIONS_TOTAL.clone()))?;
    r.register(Box::new(DEPENDENCY_FAILURES_TOTAL.clone()))?;
    r.register(Box::new(BREACHED_PASSWORDS_TOTAL.clone()))?;
    r.register(Box::new(PROCESS_START_TIME.clone()))?;
    PROCESS_START_TIME.set(chrono::Utc::now().timestamp());
    Ok(())
}

pub fn gather_metrics(r: &Registry) -> String {
    let encoder = TextEncoder::new();
    let families = r.gather();
    let mut buf = Vec::new();
    encoder.encode(&families, &mut buf).unwrap_or_default();
    String::from_utf8(buf).unwrap_or_default()
}

pub fn observe_http(method: &str, path: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION
        .with_label_values(&[method, path])
        .observe(duration_secs);
}

pub fn record_validation(endpoint: &str, valid: bool) {
    VALIDATION_RUNS_TOTAL.with_label_values(&[endpoint]).inc();
    if !valid {
        VALIDATION_FAILURES_TOTAL.with_label_values(&[endpoint]).inc();
    }
}

pub fn record_rate_limited(action: &str) {
    RATE_LIMIT_REJECTIONS_TOTAL.with_label_values(&[action]).inc();
}

pub fn record_dependency_failure(service: &str) {
    DEPENDENCY_FAILURES_TOTAL.with_label_values(&[service]).inc();
}
