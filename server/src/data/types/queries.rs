//! Query-log row types
//!
//! Every timestamp is zoned. The zone a record was observed in survives a
//! round trip through the sink.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

// ============================================================================
// User queries
// ============================================================================

/// One executed query sampled from a source log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserQuery {
    /// Sink-assigned id, `None` until inserted
    pub id: Option<i64>,
    pub user_host: String,
    pub ip_address: String,
    pub connection_id: String,
    /// Raw query text. Persisted through its digest, not on the row itself.
    pub query: String,
    /// Seconds
    pub query_time: f64,
    /// Seconds
    pub lock_time: f64,
    pub rows_sent: i64,
    pub rows_examined: i64,
    pub log_time: DateTime<FixedOffset>,
    /// Content hash of the attached digest, set by the digest layer
    pub digest_hash: Option<String>,
}

impl UserQuery {
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }
}

/// Deduplicated query text shared by many user queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAttribute {
    pub id: i64,
    pub digest: String,
    pub digest_hash: String,
}

// ============================================================================
// Flagged queries
// ============================================================================

/// A query the classifier flagged with one or more anti-pattern labels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadQuery {
    pub id: Option<i64>,
    pub log_time: DateTime<FixedOffset>,
    pub user_host: String,
    pub connection_id: String,
    pub query_time: f64,
    pub digest_hash: String,
    pub labels: Vec<String>,
}

// ============================================================================
// Connection samples
// ============================================================================

/// Connection count observed on the source at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSample {
    pub id: Option<i64>,
    pub log_time: DateTime<FixedOffset>,
    pub count: i64,
}
