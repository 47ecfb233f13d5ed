//! In-process priority queue.
//!
//! One shared heap guarded by a mutex, with two `Notify`s for the
//! "became non-empty" and "freed capacity" edges. Items are stored encoded
//! and decoded on the way out, so a corrupted entry surfaces as an error
//! from `get` rather than being skipped.

use super::RequestQueue;
use crate::codec;
use crate::error::{Error, Result};
use crate::model::{QueueEntry, WorkItem};
use crate::telemetry::metrics;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, warn};

const BACKEND: &str = "local";

/// Construction options for [`LocalQueue`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalOptions {
    /// Capacity bound. 0 = unbounded; negative is rejected.
    #[serde(default)]
    pub maxsize: i64,
}

impl LocalOptions {
    /// Parse and validate options from a config table.
    ///
    /// Unknown keys and wrong types are `Config` errors; a negative bound
    /// is a `Capacity` error.
    pub fn from_table(table: toml::Table) -> Result<Self> {
        let opts: Self = toml::Value::Table(table)
            .try_into()
            .map_err(|e| Error::Config(format!("local backend: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    pub fn validate(&self) -> Result<()> {
        if self.maxsize < 0 {
            return Err(Error::Capacity(format!(
                "local.maxsize must be >= 0, got {}",
                self.maxsize
            )));
        }
        Ok(())
    }
}

struct Inner {
    heap: BinaryHeap<QueueEntry>,
    next_sequence: u64,
    closed: bool,
}

/// Single-process priority queue for simple and sequential runs.
pub struct LocalQueue {
    inner: Mutex<Inner>,
    not_empty: Notify,
    not_full: Notify,
    /// 0 = unbounded.
    maxsize: usize,
}

impl LocalQueue {
    /// Create a queue holding at most `maxsize` entries (0 = unbounded).
    pub fn new(maxsize: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_sequence: 0,
                closed: false,
            }),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            maxsize,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    pub fn with_options(opts: &LocalOptions) -> Result<Self> {
        opts.validate()?;
        Ok(Self::new(opts.maxsize as usize))
    }

    /// Build from an untyped config table, rejecting unknown keys.
    pub fn from_options(table: toml::Table) -> Result<Self> {
        Self::with_options(&LocalOptions::from_table(table)?)
    }

    pub fn maxsize(&self) -> usize {
        self.maxsize
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // No invariant spans a panic point inside the lock, so a poisoned
        // guard is still consistent.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn has_room(&self, inner: &Inner) -> bool {
        self.maxsize == 0 || inner.heap.len() < self.maxsize
    }

    #[cfg(test)]
    fn push_raw(&self, priority: i32, payload: Vec<u8>) {
        let mut inner = self.lock();
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.heap.push(QueueEntry {
            priority,
            sequence,
            payload,
        });
        drop(inner);
        self.not_empty.notify_one();
    }
}

impl std::fmt::Debug for LocalQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("LocalQueue")
            .field("maxsize", &self.maxsize)
            .field("len", &inner.heap.len())
            .field("closed", &inner.closed)
            .finish()
    }
}

impl Default for LocalQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[async_trait]
impl RequestQueue for LocalQueue {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn put(&self, item: WorkItem, priority: Option<i32>) -> Result<()> {
        if self.is_closed() {
            debug!(url = %item.url, "put on closed queue ignored");
            return Ok(());
        }

        let priority = priority.unwrap_or(item.priority);
        let payload = codec::encode(&item)?;

        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if inner.closed {
                    debug!(url = %item.url, "queue closed while waiting for capacity");
                    return Ok(());
                }
                if self.has_room(&inner) {
                    let sequence = inner.next_sequence;
                    inner.next_sequence += 1;
                    inner.heap.push(QueueEntry {
                        priority,
                        sequence,
                        payload,
                    });
                    drop(inner);

                    self.not_empty.notify_one();
                    metrics::record_operation(BACKEND, "put");
                    debug!(url = %item.url, priority, sequence, "enqueued");
                    return Ok(());
                }
            }

            debug!(maxsize = self.maxsize, "queue full, waiting for capacity");
            notified.await;
        }
    }

    async fn get(&self) -> Result<WorkItem> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let popped = {
                let mut inner = self.lock();
                match inner.heap.pop() {
                    Some(entry) => Some(entry),
                    None if inner.closed => return Err(Error::Cancelled),
                    None => None,
                }
            };

            if let Some(entry) = popped {
                self.not_full.notify_one();
                metrics::record_operation(BACKEND, "get");
                return codec::decode(&entry.payload).inspect_err(|e| {
                    warn!(
                        priority = entry.priority,
                        sequence = entry.sequence,
                        error = %e,
                        "stored entry failed to decode"
                    );
                });
            }

            notified.await;
        }
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.lock().heap.len())
    }

    async fn clear(&self) -> Result<()> {
        let removed = {
            let mut inner = self.lock();
            let n = inner.heap.len();
            inner.heap.clear();
            n
        };
        self.not_full.notify_waiters();
        metrics::record_operation(BACKEND, "clear");
        debug!(removed, "queue cleared");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        {
            let mut inner = self.lock();
            if inner.closed {
                return Ok(());
            }
            inner.closed = true;
        }
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
        debug!("queue closed");
        Ok(())
    }
}
