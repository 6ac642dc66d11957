//! Durable access counter
//!
//! `AccessCounter` pairs a [`CounterStore`] handle with an in-memory mirror of the
//! persisted value. One async mutex serializes every read and every
//! write-then-persist sequence, so the mirror only ever holds values the store
//! has confirmed.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::storage::{CounterStore, StorageError, StorageResult};

/// A failed increment. `previous` is the unchanged counter value.
#[derive(Debug, Error)]
#[error("failed to increment access counter (still at {previous})")]
pub struct IncrementError {
    pub previous: u64,
    #[source]
    pub source: StorageError,
}

pub struct AccessCounter {
    store: Arc<dyn CounterStore>,
    count: Mutex<u64>,
}

impl AccessCounter {
    /// Load the persisted value once. A missing counter row is a configuration
    /// error and is returned as such.
    pub async fn load(store: Arc<dyn CounterStore>) -> StorageResult<Self> {
        let count = store.load().await?;
        debug!(count, "loaded access counter");

        Ok(Self {
            store,
            count: Mutex::new(count),
        })
    }

    /// Current confirmed count. Never touches storage.
    pub async fn count(&self) -> u64 {
        *self.count.lock().await
    }

    /// Persist `count + 1`, then advance the in-memory value.
    ///
    /// The lock is held across the durable write, so increments apply in
    /// lock-acquisition order. On failure nothing is advanced and the previous
    /// value travels with the error.
    pub async fn increment(&self) -> Result<u64, IncrementError> {
        let mut count = self.count.lock().await;
        let previous = *count;

        let Some(next) = previous.checked_add(1) else {
            return Err(IncrementError {
                previous,
                source: StorageError::InvalidCount(i64::MAX),
            });
        };

        if let Err(source) = self.store.persist(next).await {
            return Err(IncrementError { previous, source });
        }

        *count = next;
        Ok(next)
    }

    /// Schedule a best-effort increment on the runtime, detached from the
    /// caller. Failures are logged and dropped; nothing is retried.
    pub fn spawn_increment(self: &Arc<Self>) {
        let counter = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = counter.increment().await {
                error!(error = %err, cause = %err.source, "Failed to increment access counter");
            }
        });
    }

    pub async fn ping(&self) -> StorageResult<()> {
        self.store.ping().await
    }

    pub async fn close(&self) -> StorageResult<()> {
        self.store.close().await
    }
}
