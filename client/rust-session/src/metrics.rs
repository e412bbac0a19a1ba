use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    // API client
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dashboard_api_requests_total",
        "Total number of backend API requests by outcome",
        &["method", "outcome"]
    )
    .unwrap();

    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "dashboard_api_request_duration_seconds",
        "Backend API round-trip duration in seconds",
        &["method"],
        vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    // View-model adapters
    pub static ref ADAPTER_RECORDS_SKIPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dashboard_adapter_records_skipped_total",
        "Backend records dropped by a view-model adapter for lacking an identifying key",
        &["adapter"]
    )
    .unwrap();

    // Upload orchestrator
    pub static ref UPLOAD_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dashboard_upload_jobs_total",
        "Bulk-import upload jobs by terminal status",
        &["status"]
    )
    .unwrap();

    // Auth gateway
    pub static ref AUTH_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "dashboard_auth_events_total",
        "Identity events (sign-in, sign-up, refresh, sign-out, expiry) by outcome",
        &["event", "outcome"]
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

/// Helper: time an API round trip and count it under `outcome`.
pub fn record_api_request(method: &str, outcome: &str, started: std::time::Instant) {
    API_REQUESTS_TOTAL
        .with_label_values(&[method, outcome])
        .inc();
    API_REQUEST_DURATION_SECONDS
        .with_label_values(&[method])
        .observe(started.elapsed().as_secs_f64());
}

/// Helper: count records an adapter had to drop.
pub fn record_adapter_skips(adapter: &str, skipped: usize) {
    if skipped > 0 {
        ADAPTER_RECORDS_SKIPPED_TOTAL
            .with_label_values(&[adapter])
            .inc_by(skipped as u64);
    }
}

pub fn record_auth_event(event: &str, outcome: &str) {
    AUTH_EVENTS_TOTAL.with_label_values(&[event, outcome]).inc();
}

pub fn record_upload_job(status: &str) {
    UPLOAD_JOBS_TOTAL.with_label_values(&[status]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = API_REQUESTS_TOTAL
            .with_label_values(&["GET", "ok"])
            .get();
    }

    #[test]
    fn skips_are_counted_per_adapter() {
        let before = ADAPTER_RECORDS_SKIPPED_TOTAL
            .with_label_values(&["metrics_test"])
            .get();
        record_adapter_skips("metrics_test", 2);
        record_adapter_skips("metrics_test", 0);
        let after = ADAPTER_RECORDS_SKIPPED_TOTAL
            .with_label_values(&["metrics_test"])
            .get();
        assert_eq!(after - before, 2);
    }

    #[test]
    fn render_includes_registered_families() {
        record_auth_event("sign_in", "ok");
        let text = render_metrics().unwrap();
        assert!(text.contains("dashboard_auth_events_total"));
    }
}
