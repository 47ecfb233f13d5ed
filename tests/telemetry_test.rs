//! Integration tests for telemetry initialization and span helpers.

use dispatchq::telemetry::{self, TelemetryConfig, metrics, queue};

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process, so a second
    // init in the same binary returns Err instead of panicking.
    let config = TelemetryConfig {
        service_name: "dispatchq-test".to_string(),
        log_level: "debug".to_string(),
        ..TelemetryConfig::default()
    };
    if let Ok(guard) = telemetry::init_telemetry(config) {
        assert!(!guard.is_exporting());
        guard.force_flush();
    }
}

#[test]
fn queue_span_records_delivery() {
    let span = queue::start_queue_span("local", "get", "default");
    queue::record_delivery(&span, 42, 3);
}

#[test]
fn metric_instruments_are_noops_without_provider() {
    metrics::record_operation("local", "put");
    metrics::duplicates().add(1, &[]);
    metrics::orphans().add(2, &[]);
    metrics::wait_ms().record(1.5, &[]);
}
