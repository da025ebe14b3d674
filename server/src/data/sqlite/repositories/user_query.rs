//! User query repository
//!
//! Windows are half-open: `start <= log_time < end`, ordered by `log_time` then `id`.

use chrono::{DateTime, TimeZone};
use sqlx::sqlite::SqliteExecutor;

use crate::data::sqlite::SinkError;
use crate::data::types::UserQuery;
use crate::utils::time::{from_storage, to_storage};

type UserQueryTuple = (
    i64,
    String,
    String,
    String,
    f64,
    f64,
    i64,
    i64,
    i64,
    i32,
    Option<String>,
    Option<String>,
);

const SELECT_COLUMNS: &str = r#"
    SELECT q.id, q.user_host, q.ip_address, q.connection_id, q.query_time, q.lock_time,
           q.rows_sent, q.rows_examined, q.log_time, q.log_time_offset, q.digest_hash, a.digest
    FROM user_queries q
    LEFT JOIN query_attributes a ON a.digest_hash = q.digest_hash
"#;

fn from_tuple(row: UserQueryTuple) -> UserQuery {
    let (
        id,
        user_host,
        ip_address,
        connection_id,
        query_time,
        lock_time,
        rows_sent,
        rows_examined,
        log_time,
        log_time_offset,
        digest_hash,
        digest,
    ) = row;
    UserQuery {
        id: Some(id),
        user_host,
        ip_address,
        connection_id,
        query: digest.unwrap_or_default(),
        query_time,
        lock_time,
        rows_sent,
        rows_examined,
        log_time: from_storage(log_time, log_time_offset),
        digest_hash,
    }
}

fn check_timings(query: &UserQuery) -> Result<(), SinkError> {
    let valid = |v: f64| v.is_finite() && v >= 0.0;
    if !valid(query.query_time) || !valid(query.lock_time) {
        return Err(SinkError::Constraint(format!(
            "user_query: invalid timings query_time={} lock_time={}",
            query.query_time, query.lock_time
        )));
    }
    Ok(())
}

/// Insert a user query and return its id
///
/// `query.id` is ignored. The digest reference, when present, must already exist.
pub async fn insert_user_query<'e, E>(exec: E, query: &UserQuery) -> Result<i64, SinkError>
where
    E: SqliteExecutor<'e>,
{
    check_timings(query)?;
    let (log_time, offset) = to_storage(&query.log_time);

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO user_queries
            (user_host, ip_address, connection_id, query_time, lock_time,
             rows_sent, rows_examined, log_time, log_time_offset, digest_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&query.user_host)
    .bind(&query.ip_address)
    .bind(&query.connection_id)
    .bind(query.query_time)
    .bind(query.lock_time)
    .bind(query.rows_sent)
    .bind(query.rows_examined)
    .bind(log_time)
    .bind(offset)
    .bind(&query.digest_hash)
    .fetch_one(exec)
    .await
    .map_err(|e| {
        SinkError::from_insert(
            "user_query",
            query.digest_hash.as_deref().unwrap_or_default(),
            e,
        )
    })?;

    Ok(id)
}

/// Insert a digested user query, or return the id of the row already stored
/// for the same `(connection_id, log_time, digest_hash)`
///
/// The digest must already exist. The stored row is left untouched on conflict.
pub async fn upsert_user_query<'e, E>(exec: E, query: &UserQuery) -> Result<i64, SinkError>
where
    E: SqliteExecutor<'e>,
{
    let Some(digest_hash) = query.digest_hash.as_deref() else {
        return Err(SinkError::Constraint(
            "user_query: upsert requires a digest hash".to_string(),
        ));
    };
    check_timings(query)?;
    let (log_time, offset) = to_storage(&query.log_time);

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO user_queries
            (user_host, ip_address, connection_id, query_time, lock_time,
             rows_sent, rows_examined, log_time, log_time_offset, digest_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(connection_id, log_time, digest_hash)
            DO UPDATE SET digest_hash = excluded.digest_hash
        RETURNING id
        "#,
    )
    .bind(&query.user_host)
    .bind(&query.ip_address)
    .bind(&query.connection_id)
    .bind(query.query_time)
    .bind(query.lock_time)
    .bind(query.rows_sent)
    .bind(query.rows_examined)
    .bind(log_time)
    .bind(offset)
    .bind(digest_hash)
    .fetch_one(exec)
    .await
    .map_err(|e| SinkError::from_insert("user_query", digest_hash, e))?;

    Ok(id)
}

/// Get a user query by id
pub async fn select_user_query<'e, E>(exec: E, id: i64) -> Result<Option<UserQuery>, SinkError>
where
    E: SqliteExecutor<'e>,
{
    let sql = format!("{} WHERE q.id = ?", SELECT_COLUMNS);
    let row = sqlx::query_as::<_, UserQueryTuple>(&sql)
        .bind(id)
        .fetch_optional(exec)
        .await?;
    Ok(row.map(from_tuple))
}

/// User queries logged in `[start, end)`
pub async fn select_user_queries<'e, E, Tz>(
    exec: E,
    start: &DateTime<Tz>,
    end: &DateTime<Tz>,
) -> Result<Vec<UserQuery>, SinkError>
where
    E: SqliteExecutor<'e>,
    Tz: TimeZone,
{
    let sql = format!(
        "{} WHERE q.log_time >= ? AND q.log_time < ? ORDER BY q.log_time, q.id",
        SELECT_COLUMNS
    );
    let rows = sqlx::query_as::<_, UserQueryTuple>(&sql)
        .bind(start.timestamp_micros())
        .bind(end.timestamp_micros())
        .fetch_all(exec)
        .await?;
    Ok(rows.into_iter().map(from_tuple).collect())
}

/// Overwrite every column of an existing user query
///
/// Fails with `NotFound` when `query.id` is unset or matches no row.
pub async fn update_user_query<'e, E>(exec: E, query: &UserQuery) -> Result<(), SinkError>
where
    E: SqliteExecutor<'e>,
{
    let Some(id) = query.id else {
        return Err(SinkError::not_found("user_query", "<unsaved>"));
    };
    check_timings(query)?;
    let (log_time, offset) = to_storage(&query.log_time);

    let result = sqlx::query(
        r#"
        UPDATE user_queries
        SET user_host = ?, ip_address = ?, connection_id = ?, query_time = ?, lock_time = ?,
            rows_sent = ?, rows_examined = ?, log_time = ?, log_time_offset = ?, digest_hash = ?
        WHERE id = ?
        "#,
    )
    .bind(&query.user_host)
    .bind(&query.ip_address)
    .bind(&query.connection_id)
    .bind(query.query_time)
    .bind(query.lock_time)
    .bind(query.rows_sent)
    .bind(query.rows_examined)
    .bind(log_time)
    .bind(offset)
    .bind(&query.digest_hash)
    .bind(id)
    .execute(exec)
    .await
    .map_err(|e| {
        SinkError::from_insert(
            "user_query",
            query.digest_hash.as_deref().unwrap_or_default(),
            e,
        )
    })?;

    if result.rows_affected() == 0 {
        return Err(SinkError::not_found("user_query", id));
    }
    Ok(())
}

/// Point a user query at a digest. Returns false when the query does not exist.
pub async fn set_digest_hash<'e, E>(exec: E, id: i64, digest_hash: &str) -> Result<bool, SinkError>
where
    E: SqliteExecutor<'e>,
{
    let result = sqlx::query("UPDATE user_queries SET digest_hash = ? WHERE id = ?")
        .bind(digest_hash)
        .bind(id)
        .execute(exec)
        .await
        .map_err(|e| SinkError::from_insert("user_query", digest_hash, e))?;
    Ok(result.rows_affected() > 0)
}
