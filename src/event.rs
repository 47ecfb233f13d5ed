//! Structured events emitted by the distributed queue.
//!
//! Consumers subscribe to the stream to build dashboards, alerting, or
//! audit logs. Dropped orphans in particular are announced here so they
//! never vanish without a signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A structured event emitted by a queue backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEvent {
    /// Namespace of the queue that emitted the event.
    pub namespace: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl QueueEvent {
    pub fn new(namespace: impl Into<String>, kind: EventKind) -> Self {
        Self {
            namespace: namespace.into(),
            timestamp: Utc::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Enqueued {
        entry_id: i64,
        priority: i32,
    },
    /// A put was dropped because its fingerprint was already recorded.
    Duplicate {
        fingerprint: String,
    },
    /// A duplicate put re-ranked the already-queued entry.
    PriorityUpdated {
        fingerprint: String,
        priority: i32,
    },
    Leased {
        entry_id: i64,
        attempts: u32,
    },
    Acked {
        entry_id: i64,
    },
    OrphanRequeued {
        entry_id: i64,
        attempts: u32,
    },
    OrphanDropped {
        entry_id: i64,
        url: String,
        attempts: u32,
    },
}
