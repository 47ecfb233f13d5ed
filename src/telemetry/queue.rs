//! Span helpers for queue operations.

use tracing::Span;

/// Start a span for a queue operation.
///
/// The `queue.entry_id` and `queue.attempts` fields are declared empty and
/// can be filled via [`record_delivery`].
pub fn start_queue_span(backend: &str, operation: &str, namespace: &str) -> Span {
    tracing::info_span!(
        "queue.op",
        "queue.backend" = backend,
        "queue.operation" = operation,
        "queue.namespace" = namespace,
        "queue.entry_id" = tracing::field::Empty,
        "queue.attempts" = tracing::field::Empty,
    )
}

/// Record which entry a `get` delivered.
pub fn record_delivery(span: &Span, entry_id: i64, attempts: u32) {
    span.record("queue.entry_id", entry_id);
    span.record("queue.attempts", attempts);
}
