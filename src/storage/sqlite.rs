use crate::storage::trait_def::{from_column, to_column};
use crate::storage::{CounterStore, StorageError, StorageResult};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl CounterStore for SqliteStorage {
    async fn init(&self) -> StorageResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS counter (
                id INTEGER PRIMARY KEY,
                count INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("INSERT OR IGNORE INTO counter (id, count) VALUES (1, 0)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn load(&self) -> StorageResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT count FROM counter WHERE id = 1")
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(StorageError::MissingCounterRow)?;

        from_column(count)
    }

    async fn persist(&self, next: u64) -> StorageResult<()> {
        let next = to_column(next)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE counter SET count = ? WHERE id = 1")
            .bind(next)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StorageError::MissingCounterRow);
        }

        tx.commit().await?;

        Ok(())
    }

    async fn ping(&self) -> StorageResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
