//! Long-running transaction repository

use chrono::{DateTime, TimeZone};
use sqlx::sqlite::{SqliteConnection, SqliteExecutor};

use super::transaction::transaction_exists;
use crate::data::sqlite::SinkError;
use crate::data::types::LongTxn;
use crate::utils::time::{from_storage, to_storage};

/// Flag a stored transaction as long running
pub async fn insert_long_txn(conn: &mut SqliteConnection, txn: &LongTxn) -> Result<i64, SinkError> {
    if !transaction_exists(&mut *conn, &txn.transaction_id).await? {
        return Err(SinkError::ReferentialIntegrity {
            entity: "long_txn",
            reference: txn.transaction_id.clone(),
        });
    }

    let (log_time, offset) = to_storage(&txn.log_time);
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO long_txns (log_time, log_time_offset, transaction_id) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(log_time)
    .bind(offset)
    .bind(&txn.transaction_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| SinkError::from_insert("long_txn", &txn.transaction_id, e))?;

    Ok(id)
}

/// Long transactions observed in `[start, end)`
pub async fn select_long_txns<'e, E, Tz>(
    exec: E,
    start: &DateTime<Tz>,
    end: &DateTime<Tz>,
) -> Result<Vec<LongTxn>, SinkError>
where
    E: SqliteExecutor<'e>,
    Tz: TimeZone,
{
    let rows = sqlx::query_as::<_, (i64, i64, i32, String)>(
        r#"
        SELECT id, log_time, log_time_offset, transaction_id
        FROM long_txns
        WHERE log_time >= ? AND log_time < ?
        ORDER BY log_time, id
        "#,
    )
    .bind(start.timestamp_micros())
    .bind(end.timestamp_micros())
    .fetch_all(exec)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, log_time, offset, transaction_id)| LongTxn {
            id: Some(id),
            log_time: from_storage(log_time, offset),
            transaction_id,
        })
        .collect())
}
