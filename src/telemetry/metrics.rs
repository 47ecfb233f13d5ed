//! Metric instrument factories for dispatchq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without a provider every instrument is a no-op.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("dispatchq")
}

/// Counter: queue operations (put, get, ack, clear, reap).
/// Labels: `backend`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("dispatchq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: puts recognized as duplicates.
/// Labels: `namespace`, `result` ("dropped" | "priority_updated").
pub fn duplicates() -> Counter<u64> {
    meter()
        .u64_counter("dispatchq.queue.duplicates")
        .with_description("Number of duplicate puts")
        .build()
}

/// Counter: orphaned leases found by the sweep.
/// Labels: `namespace`, `outcome` ("requeued" | "dropped").
pub fn orphans() -> Counter<u64> {
    meter()
        .u64_counter("dispatchq.queue.orphans")
        .with_description("Number of expired leases reconciled")
        .build()
}

/// Histogram: time a `get` spent waiting before it was served.
/// Labels: `backend`.
pub fn wait_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("dispatchq.queue.wait_ms")
        .with_description("Time spent waiting in get")
        .with_unit("ms")
        .build()
}

pub fn record_operation(backend: &'static str, operation: &'static str) {
    queue_operations().add(
        1,
        &[
            KeyValue::new("backend", backend),
            KeyValue::new("operation", operation),
        ],
    );
}
