pub mod counter;
pub mod postgres;
pub mod sqlite;
pub mod trait_def;

use std::sync::Arc;

use crate::config::{DatabaseBackend, DatabaseConfig};

pub use counter::{AccessCounter, IncrementError};
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{CounterStore, StorageError, StorageResult};

/// Connect to the configured backend.
pub async fn open_store(config: &DatabaseConfig) -> StorageResult<Arc<dyn CounterStore>> {
    let store: Arc<dyn CounterStore> = match config.backend {
        DatabaseBackend::Sqlite => {
            Arc::new(SqliteStorage::new(&config.url, config.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            Arc::new(PostgresStorage::new(&config.url, config.max_connections).await?)
        }
    };

    Ok(store)
}
