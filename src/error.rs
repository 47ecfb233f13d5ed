//! Error types for dispatchq.

use thiserror::Error;

/// A distributed entry whose lease expired too many times and was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("entry {entry_id} ({url}) dropped after {attempts} orphaned deliveries")]
pub struct OrphanExhausted {
    pub entry_id: i64,
    pub url: String,
    pub attempts: u32,
}

#[derive(Debug, Error)]
pub enum Error {
    /// Unknown or mistyped construction option. Raised before any connection is opened.
    #[error("config error: {0}")]
    Config(String),

    /// Invalid queue bound.
    #[error("capacity error: {0}")]
    Capacity(String),

    /// Bytes presented to the codec do not match the wire schema.
    #[error("decode error: {0}")]
    Decode(String),

    /// Input of the wrong kind (e.g. empty payload, empty locator).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The queue was closed and has nothing left to hand out.
    #[error("queue closed")]
    Cancelled,

    /// A caller-specified wait elapsed.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Backing store unavailable or failed. Never retried by the queue.
    #[error("backend error: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    OrphanExhausted(#[from] OrphanExhausted),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for the cooperative shutdown outcome of `get`.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
