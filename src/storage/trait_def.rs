use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("access counter row is missing; the schema must seed it at zero")]
    MissingCounterRow,
    #[error("persisted access counter value {0} is out of range")]
    InvalidCount(i64),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Durable home of the access counter.
///
/// The counter lives in a single row (`id = 1`). Implementations never cache the
/// value; `AccessCounter` owns the in-memory mirror.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Create the counter table and seed its row at zero if absent
    async fn init(&self) -> StorageResult<()>;

    /// Read the persisted counter value
    async fn load(&self) -> StorageResult<u64>;

    /// Write `next` inside a transaction. A failed write leaves the row untouched.
    async fn persist(&self, next: u64) -> StorageResult<()>;

    /// Check that the backend answers queries
    async fn ping(&self) -> StorageResult<()>;

    /// Close the underlying pool
    async fn close(&self) -> StorageResult<()>;
}

pub(crate) fn to_column(value: u64) -> StorageResult<i64> {
    i64::try_from(value).map_err(|_| StorageError::InvalidCount(i64::MAX))
}

pub(crate) fn from_column(value: i64) -> StorageResult<u64> {
    u64::try_from(value).map_err(|_| StorageError::InvalidCount(value))
}
