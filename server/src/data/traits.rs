//! Repository trait for the sink
//!
//! Jobs write through this trait so they can be exercised against an
//! in-memory sink or a test double.

use async_trait::async_trait;

use crate::data::sqlite::SinkError;
use crate::data::types::{BadQuery, ConnectionSample, LockEvent, UserQuery};

/// Write-side operations used by the cron jobs
#[async_trait]
pub trait SinkRepository: Send + Sync {
    /// Store a user query with its deduplicated digest in one transaction
    ///
    /// Idempotent per `(connection_id, log_time, digest)`: returns the id of the
    /// row already stored for that record.
    async fn store_user_query(&self, query: &UserQuery) -> Result<i64, SinkError>;

    /// Store the digest of `query` and a flagged-query row in one transaction
    ///
    /// Re-recording the same query keeps its row and replaces its labels.
    async fn record_bad_query(
        &self,
        query: &UserQuery,
        labels: Vec<String>,
    ) -> Result<i64, SinkError>;

    /// Store a lock wait or long transaction after the transactions it
    /// references, in one transaction
    async fn record_lock_event(&self, event: &LockEvent) -> Result<i64, SinkError>;

    /// Append one sample to the connection time series
    async fn insert_connection_sample(&self, sample: &ConnectionSample) -> Result<i64, SinkError>;

    /// Flagged query rows, oldest first (used by the CLI and tests)
    async fn list_bad_queries(
        &self,
        start: &chrono::DateTime<chrono::Utc>,
        end: &chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<BadQuery>, SinkError>;
}
