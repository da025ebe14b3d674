//! Connection-count time series

use chrono::{DateTime, TimeZone};
use sqlx::sqlite::SqliteExecutor;

use crate::data::sqlite::SinkError;
use crate::data::types::ConnectionSample;
use crate::utils::time::{from_storage, to_storage};

pub async fn insert_connection_sample<'e, E>(
    exec: E,
    sample: &ConnectionSample,
) -> Result<i64, SinkError>
where
    E: SqliteExecutor<'e>,
{
    let (log_time, offset) = to_storage(&sample.log_time);
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO connections (log_time, log_time_offset, count) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(log_time)
    .bind(offset)
    .bind(sample.count)
    .fetch_one(exec)
    .await
    .map_err(|e| SinkError::from_insert("connection_sample", "", e))?;
    Ok(id)
}

/// Samples taken in `[start, end)`
pub async fn select_connection_samples<'e, E, Tz>(
    exec: E,
    start: &DateTime<Tz>,
    end: &DateTime<Tz>,
) -> Result<Vec<ConnectionSample>, SinkError>
where
    E: SqliteExecutor<'e>,
    Tz: TimeZone,
{
    let rows = sqlx::query_as::<_, (i64, i64, i32, i64)>(
        r#"
        SELECT id, log_time, log_time_offset, count
        FROM connections
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
        .map(|(id, log_time, offset, count)| ConnectionSample {
            id: Some(id),
            log_time: from_storage(log_time, offset),
            count,
        })
        .collect())
}
