//! SQLite sink service
//!
//! Owns every persisted row of the pipeline. Configured for concurrent job writers:
//! - WAL mode so readers never block the jobs
//! - foreign keys enforced for lock waits, long transactions and digests
//! - busy timeout so writers queue instead of failing on lock contention

pub mod error;
mod migrations;
pub mod repositories;
mod repository_impl;
pub mod schema;

pub use error::SinkError;
pub use sqlx::SqlitePool;

use std::path::Path;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::ConnectOptions;
use tracing::log::LevelFilter;

use crate::core::constants::{
    SQLITE_BUSY_TIMEOUT_SECS, SQLITE_CACHE_SIZE, SQLITE_MAX_CONNECTIONS,
};

/// Sink database service
///
/// Created once at startup and shared by every job through an `Arc`.
pub struct SinkService {
    pool: SqlitePool,
}

impl SinkService {
    /// Open (or create) the sink database at `path` and run pending migrations
    pub async fn init(path: &Path) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(SQLITE_BUSY_TIMEOUT_SECS))
            .pragma("cache_size", SQLITE_CACHE_SIZE)
            .pragma("temp_store", "MEMORY")
            .log_statements(LevelFilter::Trace);

        let pool = SqlitePoolOptions::new()
            .max_connections(SQLITE_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        migrations::run_migrations(&pool).await?;

        tracing::debug!(path = %path.display(), "SinkService initialized");
        Ok(Self { pool })
    }

    /// Single-connection in-memory sink (tests and dry runs)
    pub async fn in_memory() -> Result<Self, SinkError> {
        let options = "sqlite::memory:"
            .parse::<SqliteConnectOptions>()?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        migrations::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run `f` inside a transaction scoped to this call
    pub async fn with_handle<T, F>(&self, f: F) -> Result<T, SinkError>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, SinkError>>,
    {
        in_transaction(&self.pool, f).await
    }

    pub async fn checkpoint(&self) -> Result<(), SinkError> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        tracing::debug!("WAL checkpoint completed");
        Ok(())
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("Sink pool closed");
    }
}

/// Commit when `f` succeeds, roll back when it fails
///
/// The transaction is also rolled back if the future is dropped mid-flight.
pub async fn in_transaction<T, F>(pool: &SqlitePool, f: F) -> Result<T, SinkError>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, SinkError>>,
{
    let mut tx = pool.begin().await?;

    match f(&mut *tx).await {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            // Best-effort rollback - log but return original error
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!("ROLLBACK failed after transaction error: {}", rollback_err);
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("mart.db");

        let sink = SinkService::init(&path).await.unwrap();
        assert!(path.exists());

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('user_queries', 'query_attributes', 'transactions', 'lock_waits', 'long_txns', 'bad_queries', 'connections')",
        )
        .fetch_one(sink.pool())
        .await
        .unwrap();
        assert_eq!(tables, 7);

        sink.checkpoint().await.unwrap();
        sink.close().await;
    }

    #[tokio::test]
    async fn test_with_handle_commits_on_ok() {
        let sink = SinkService::in_memory().await.unwrap();

        sink.with_handle(|conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO connections (log_time, log_time_offset, count) VALUES (1, 0, 3)")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .await
        .unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM connections")
            .fetch_one(sink.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_with_handle_rolls_back_on_err() {
        let sink = SinkService::in_memory().await.unwrap();

        let result: Result<(), SinkError> = sink
            .with_handle(|conn| {
                Box::pin(async move {
                    sqlx::query("INSERT INTO connections (log_time, log_time_offset, count) VALUES (1, 0, 3)")
                        .execute(&mut *conn)
                        .await?;
                    Err(SinkError::Constraint("abort".to_string()))
                })
            })
            .await;
        assert!(matches!(result, Err(SinkError::Constraint(_))));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM connections")
            .fetch_one(sink.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_foreign_keys_enforced() {
        let sink = SinkService::in_memory().await.unwrap();
        let result = sqlx::query(
            "INSERT INTO long_txns (log_time, log_time_offset, transaction_id) VALUES (0, 0, 'missing')",
        )
        .execute(sink.pool())
        .await;
        assert!(result.is_err());
    }
}
