//! InnoDB lock-wait repository

use chrono::{DateTime, TimeZone};
use sqlx::sqlite::{SqliteConnection, SqliteExecutor};

use super::transaction::transaction_exists;
use crate::data::sqlite::SinkError;
use crate::data::types::InnodbLockWait;
use crate::utils::time::{from_storage, to_storage};

/// Insert a lock wait. Both transactions must already be stored.
///
/// Run inside a scoped handle so the existence checks and the insert see the
/// same snapshot.
pub async fn insert_lock_wait(
    conn: &mut SqliteConnection,
    wait: &InnodbLockWait,
) -> Result<i64, SinkError> {
    for reference in [&wait.waiting_id, &wait.blocking_id] {
        if !transaction_exists(&mut *conn, reference).await? {
            return Err(SinkError::ReferentialIntegrity {
                entity: "lock_wait",
                reference: reference.clone(),
            });
        }
    }

    let (log_time, offset) = to_storage(&wait.log_time);
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO lock_waits (log_time, log_time_offset, waiting_id, blocking_id)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(log_time)
    .bind(offset)
    .bind(&wait.waiting_id)
    .bind(&wait.blocking_id)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| SinkError::from_insert("lock_wait", &wait.waiting_id, e))?;

    Ok(id)
}

/// Lock waits observed in `[start, end)`
pub async fn select_lock_waits<'e, E, Tz>(
    exec: E,
    start: &DateTime<Tz>,
    end: &DateTime<Tz>,
) -> Result<Vec<InnodbLockWait>, SinkError>
where
    E: SqliteExecutor<'e>,
    Tz: TimeZone,
{
    let rows = sqlx::query_as::<_, (i64, i64, i32, String, String)>(
        r#"
        SELECT id, log_time, log_time_offset, waiting_id, blocking_id
        FROM lock_waits
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
        .map(|(id, log_time, offset, waiting_id, blocking_id)| InnodbLockWait {
            id: Some(id),
            log_time: from_storage(log_time, offset),
            waiting_id,
            blocking_id,
        })
        .collect())
}
