//! Flagged query repository

use chrono::{DateTime, TimeZone};
use sqlx::sqlite::SqliteExecutor;

use crate::data::sqlite::SinkError;
use crate::data::types::BadQuery;
use crate::utils::time::{from_storage, to_storage};

const LABEL_SEPARATOR: &str = ",";

/// Insert a flagged query and return its id. Its digest must already be stored.
///
/// A query already flagged at the same `(connection_id, log_time, digest_hash)`
/// keeps its id and takes the new labels.
pub async fn insert_bad_query<'e, E>(exec: E, query: &BadQuery) -> Result<i64, SinkError>
where
    E: SqliteExecutor<'e>,
{
    if query.labels.is_empty() {
        return Err(SinkError::Constraint(
            "bad_query: at least one label is required".to_string(),
        ));
    }

    let (log_time, offset) = to_storage(&query.log_time);
    let labels = query.labels.join(LABEL_SEPARATOR);

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO bad_queries
            (log_time, log_time_offset, user_host, connection_id, query_time, digest_hash, labels)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(connection_id, log_time, digest_hash) DO UPDATE SET labels = excluded.labels
        RETURNING id
        "#,
    )
    .bind(log_time)
    .bind(offset)
    .bind(&query.user_host)
    .bind(&query.connection_id)
    .bind(query.query_time)
    .bind(&query.digest_hash)
    .bind(labels)
    .fetch_one(exec)
    .await
    .map_err(|e| SinkError::from_insert("bad_query", &query.digest_hash, e))?;

    Ok(id)
}

/// Flagged queries logged in `[start, end)`
pub async fn select_bad_queries<'e, E, Tz>(
    exec: E,
    start: &DateTime<Tz>,
    end: &DateTime<Tz>,
) -> Result<Vec<BadQuery>, SinkError>
where
    E: SqliteExecutor<'e>,
    Tz: TimeZone,
{
    let rows = sqlx::query_as::<_, (i64, i64, i32, String, String, f64, String, String)>(
        r#"
        SELECT id, log_time, log_time_offset, user_host, connection_id, query_time, digest_hash, labels
        FROM bad_queries
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
        .map(
            |(id, log_time, offset, user_host, connection_id, query_time, digest_hash, labels)| {
                BadQuery {
                    id: Some(id),
                    log_time: from_storage(log_time, offset),
                    user_host,
                    connection_id,
                    query_time,
                    digest_hash,
                    labels: labels
                        .split(LABEL_SEPARATOR)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string)
                        .collect(),
                }
            },
        )
        .collect())
}
