//! The queue contract and its backends.
//!
//! Every backend exposes the same surface: `put`, `get`, `size`, `clear`,
//! `close`. A queue starts open and can only move to closed. After close,
//! `put` is a silent no-op. The local `get` drains what is left before
//! yielding [`Error::Cancelled`]; the distributed `get` yields it at once,
//! since its connection is released and ready entries stay in the store.
//! For the same reason the distributed `size`, `clear` and `ack` return
//! [`Error::Cancelled`] after close rather than a backend error.

pub mod distributed;
pub mod factory;
pub mod local;

pub use distributed::{DistributedOptions, DistributedQueue, ReapReport};
pub use factory::{QueueFactory, QueueSettings};
pub use local::{LocalOptions, LocalQueue};

use crate::error::{Error, Result};
use crate::model::WorkItem;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Shared operation set implemented by every queue backend.
#[async_trait]
pub trait RequestQueue: Send + Sync {
    /// Short identifier of the backend (e.g. "local").
    fn backend(&self) -> &'static str;

    /// Store `item`. An explicit `priority` overrides the item's own.
    ///
    /// Suspends while a bounded queue is full. Never fails once the queue
    /// is closed; the item is silently dropped instead.
    async fn put(&self, item: WorkItem, priority: Option<i32>) -> Result<()>;

    /// Take the best-ranked ready item, waiting while the queue is open and empty.
    async fn get(&self) -> Result<WorkItem>;

    /// Number of ready entries. Leased entries are not counted.
    ///
    /// A closed queue whose entries live outside the process reports
    /// [`Error::Cancelled`].
    async fn size(&self) -> Result<usize>;

    /// Remove every entry and any bookkeeping kept for it.
    ///
    /// Like `size`, reports [`Error::Cancelled`] on a closed shared queue.
    async fn clear(&self) -> Result<()>;

    /// Close the queue and wake every waiting caller. Idempotent.
    async fn close(&self) -> Result<()>;

    /// Mark a delivered item as done. Backends without leases accept anything;
    /// leasing backends report [`Error::Cancelled`] once closed.
    async fn ack(&self, _item: &WorkItem) -> Result<()> {
        Ok(())
    }

    /// `get`, giving up after `timeout` with [`Error::Timeout`].
    ///
    /// Backends that hand out leases override this so the deadline only
    /// bounds waiting, never a claim already in flight.
    async fn get_timeout(&self, timeout: Duration) -> Result<WorkItem> {
        match tokio::time::timeout(timeout, self.get()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }
}

impl fmt::Debug for dyn RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestQueue")
            .field("backend", &self.backend())
            .finish_non_exhaustive()
    }
}
