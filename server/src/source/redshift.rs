//! Redshift source
//!
//! Reads executed queries from `stl_query`, open sessions from
//! `stv_sessions` and table locks from `svv_transactions`. Redshift speaks the
//! Postgres wire protocol, so the pool is a plain sqlx `PgPool`. The pool
//! connects lazily: an unreachable cluster fails individual job windows
//! instead of startup.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::log::LevelFilter;

use super::{ConnectionSource, LockSource, QuerySource, SourceError, TxnLock};
use crate::core::constants::{SOURCE_ACQUIRE_TIMEOUT_SECS, SOURCE_MAX_CONNECTIONS};
use crate::data::types::{Transaction, UserQuery};

const QUERIES_SQL: &str = r#"
SELECT COALESCE(TRIM(u.usename), '') AS user_name,
       q.pid::text AS pid,
       TRIM(q.querytxt) AS query,
       EXTRACT(EPOCH FROM q.starttime)::float8 AS start_epoch,
       EXTRACT(EPOCH FROM (q.endtime - q.starttime))::float8 AS duration
FROM stl_query q
LEFT JOIN pg_user u ON q.userid = u.usesysid
WHERE q.starttime >= $1::timestamp AND q.starttime < $2::timestamp
ORDER BY q.starttime, q.query
"#;

const CONNECTIONS_SQL: &str = "SELECT COUNT(*) FROM stv_sessions";

// One row per lock. The running statement of the session stands in for the
// transaction's query text.
const LOCKS_SQL: &str = r#"
SELECT t.xid::text AS xid,
       t.pid::text AS pid,
       COALESCE(TRIM(r.query), '') AS query,
       EXTRACT(EPOCH FROM t.txn_start)::float8 AS start_epoch,
       COALESCE(TRIM(t.lock_mode), '') AS lock_mode,
       COALESCE(TRIM(t.lockable_object_type), '') AS lock_type,
       COALESCE(TRIM(c.relname), t.relation::text, '') AS lock_table,
       t.granted
FROM svv_transactions t
LEFT JOIN stv_recents r ON r.pid = t.pid AND r.status = 'Running'
LEFT JOIN pg_class c ON c.oid = t.relation
ORDER BY t.txn_start, t.xid
"#;

type LockRow = (String, String, String, Option<f64>, String, String, String, bool);

/// Bind format for window bounds. `stl_query.starttime` is UTC without zone.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub struct RedshiftSource {
    pool: PgPool,
}

impl RedshiftSource {
    pub fn connect(url: &str) -> Result<Self, SourceError> {
        if url.is_empty() {
            return Err(SourceError::Config("Redshift URL is required".into()));
        }

        let options: PgConnectOptions = url
            .parse()
            .map_err(|e| SourceError::Config(format!("Invalid Redshift URL: {}", e)))?;
        let options = options.log_statements(LevelFilter::Trace);

        let pool = PgPoolOptions::new()
            .max_connections(SOURCE_MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(SOURCE_ACQUIRE_TIMEOUT_SECS))
            .connect_lazy_with(options);

        tracing::debug!("Redshift source pool created");
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl QuerySource for RedshiftSource {
    async fn get_queries(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UserQuery>, SourceError> {
        let rows = sqlx::query_as::<_, (String, String, String, f64, f64)>(QUERIES_SQL)
            .bind(start.format(TIMESTAMP_FORMAT).to_string())
            .bind(end.format(TIMESTAMP_FORMAT).to_string())
            .fetch_all(&self.pool)
            .await?;

        let mut queries = Vec::with_capacity(rows.len());
        for (user_name, pid, query, start_epoch, duration) in rows {
            match to_user_query(user_name, pid, query, start_epoch, duration) {
                Ok(q) => queries.push(q),
                Err(e) => tracing::warn!(error = %e, "Skipping stl_query row"),
            }
        }

        tracing::debug!(count = queries.len(), %start, %end, "Fetched Redshift queries");
        Ok(queries)
    }
}

#[async_trait]
impl ConnectionSource for RedshiftSource {
    async fn get_connections(&self) -> Result<i64, SourceError> {
        let count: i64 = sqlx::query_scalar(CONNECTIONS_SQL)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl LockSource for RedshiftSource {
    async fn get_locks(&self) -> Result<Vec<TxnLock>, SourceError> {
        let rows = sqlx::query_as::<_, LockRow>(LOCKS_SQL)
            .fetch_all(&self.pool)
            .await?;

        let mut locks = Vec::with_capacity(rows.len());
        for row in rows {
            match to_txn_lock(row) {
                Ok(lock) => locks.push(lock),
                Err(e) => tracing::warn!(error = %e, "Skipping svv_transactions row"),
            }
        }

        tracing::debug!(count = locks.len(), "Fetched Redshift locks");
        Ok(locks)
    }
}

/// Map one `svv_transactions` row. Redshift locks whole relations, so there
/// is no index, lock data or wait start.
fn to_txn_lock(row: LockRow) -> Result<TxnLock, SourceError> {
    let (xid, pid, query, start_epoch, lock_mode, lock_type, lock_table, granted) = row;

    let start_time = match start_epoch {
        Some(epoch) => Some(
            DateTime::from_timestamp_micros((epoch * 1_000_000.0).round() as i64)
                .ok_or_else(|| {
                    SourceError::InvalidRow(format!("txn_start {} out of range", epoch))
                })?
                .fixed_offset(),
        ),
        None => None,
    };

    Ok(TxnLock {
        transaction: Transaction {
            id: xid,
            thread: pid,
            query,
            start_time,
            wait_start_time: None,
            lock_mode,
            lock_type,
            lock_table,
            lock_index: String::new(),
            lock_data: String::new(),
        },
        granted,
    })
}

/// Map one `stl_query` row. Redshift reports neither client IP nor row counts here.
fn to_user_query(
    user_name: String,
    pid: String,
    query: String,
    start_epoch: f64,
    duration: f64,
) -> Result<UserQuery, SourceError> {
    let micros = (start_epoch * 1_000_000.0).round() as i64;
    let log_time = DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| SourceError::InvalidRow(format!("starttime {} out of range", start_epoch)))?
        .fixed_offset();

    Ok(UserQuery {
        id: None,
        user_host: user_name,
        ip_address: String::new(),
        connection_id: pid,
        query,
        query_time: duration.max(0.0),
        lock_time: 0.0,
        rows_sent: 0,
        rows_examined: 0,
        log_time,
        digest_hash: None,
    })
}
