//! Core data model.
//!
//! A work item is a request waiting to be fetched. It has a locator, the
//! fetch parameters, a priority, and (once delivered by the distributed
//! backend) a lease.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const DEFAULT_METHOD: &str = "GET";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of pending fetch work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Target locator. Must be non-empty.
    pub url: String,

    /// HTTP verb.
    pub method: String,

    pub headers: Option<BTreeMap<String, String>>,

    pub cookies: Option<BTreeMap<String, String>>,

    pub body: Option<Vec<u8>>,

    /// Priority. Lower = served first.
    pub priority: i32,

    /// How many times the fetcher has already retried this request.
    pub retries: u32,

    pub timeout_ms: u64,

    pub proxy: Option<String>,

    /// Free-form data carried alongside the request. The queue doesn't interpret it.
    pub meta: Option<BTreeMap<String, serde_json::Value>>,

    /// Creation time in milliseconds since the epoch. Stamped at encode time when unset.
    pub timestamp_ms: Option<i64>,

    /// Set by the distributed backend on delivery. Never encoded.
    #[serde(skip)]
    pub lease: Option<Lease>,
}

impl WorkItem {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: DEFAULT_METHOD.to_string(),
            headers: None,
            cookies: None,
            body: None,
            priority: 0,
            retries: 0,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            proxy: None,
            meta: None,
            timestamp_ms: None,
            lease: None,
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value);
        self
    }

    pub fn timestamp_ms(mut self, ts: i64) -> Self {
        self.timestamp_ms = Some(ts);
        self
    }

    /// Delivery attempt count, if this item came from a leasing backend.
    pub fn attempts(&self) -> Option<u32> {
        self.lease.as_ref().map(|l| l.attempts)
    }
}

// ---------------------------------------------------------------------------
// Queue Entry
// ---------------------------------------------------------------------------

/// A stored, encoded work item ranked by (priority, sequence).
///
/// `Ord` is reversed so that `BinaryHeap` pops the lowest priority value
/// first, and the lowest sequence among equal priorities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Priority in effect at enqueue time (an explicit `put` priority wins over the item's).
    pub priority: i32,
    /// Monotonically increasing per queue; FIFO tie-break.
    pub sequence: u64,
    pub payload: Vec<u8>,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// Lease
// ---------------------------------------------------------------------------

/// A time-bounded claim a consumer holds on a delivered entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Sequence number of the stored entry.
    pub entry_id: i64,
    /// Token of the queue instance holding the lease.
    pub holder: Uuid,
    pub expires_at: DateTime<Utc>,
    /// Number of times this entry has been delivered, including this one.
    pub attempts: u32,
}
