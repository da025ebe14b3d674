//! Source databases the jobs extract from
//!
//! - `redshift` - `stl_query`, `stv_sessions` and `svv_transactions` over a
//!   Postgres-wire pool
//! - `slow_log` - MySQL slow-query-log file reader
//!
//! Windows are half-open: a record belongs to `[start, end)` when
//! `start <= log_time < end`.

pub mod redshift;
pub mod slow_log;

pub use redshift::RedshiftSource;
pub use slow_log::SlowLogSource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::data::types::{Transaction, UserQuery};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid source row: {0}")]
    InvalidRow(String),
}

/// Sampled queries executed in a time window
#[async_trait]
pub trait QuerySource: Send + Sync {
    async fn get_queries(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UserQuery>, SourceError>;
}

/// Current number of open sessions on the source
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    async fn get_connections(&self) -> Result<i64, SourceError>;
}

/// One lock a transaction holds or waits for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnLock {
    /// The transaction, with the locked relation in `lock_table`
    pub transaction: Transaction,
    pub granted: bool,
}

/// Locks currently held or requested on the source
#[async_trait]
pub trait LockSource: Send + Sync {
    async fn get_locks(&self) -> Result<Vec<TxnLock>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SourceError::Config("source url is required".to_string());
        assert_eq!(err.to_string(), "Configuration error: source url is required");

        let err = SourceError::InvalidRow("starttime out of range".to_string());
        assert_eq!(err.to_string(), "Invalid source row: starttime out of range");
    }
}
