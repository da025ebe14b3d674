//! InnoDB transaction repository

use sqlx::sqlite::{SqliteConnection, SqliteExecutor};

use crate::data::sqlite::SinkError;
use crate::data::types::Transaction;
use crate::utils::time::{from_storage, to_storage};

type TransactionTuple = (
    String,
    String,
    String,
    Option<i64>,
    Option<i32>,
    Option<i64>,
    Option<i32>,
    String,
    String,
    String,
    String,
    String,
);

fn zoned(micros: Option<i64>, offset: Option<i32>) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    micros.map(|m| from_storage(m, offset.unwrap_or(0)))
}

/// Insert a transaction keyed by its source id
pub async fn insert_transaction<'e, E>(exec: E, txn: &Transaction) -> Result<(), SinkError>
where
    E: SqliteExecutor<'e>,
{
    if !txn.has_consistent_times() {
        return Err(SinkError::Constraint(format!(
            "transaction {}: wait started before the transaction",
            txn.id
        )));
    }

    let start = txn.start_time.as_ref().map(to_storage);
    let wait = txn.wait_start_time.as_ref().map(to_storage);

    sqlx::query(
        r#"
        INSERT INTO transactions
            (id, thread, query, start_time, start_time_offset, wait_start_time, wait_start_time_offset,
             lock_mode, lock_type, lock_table, lock_index, lock_data)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&txn.id)
    .bind(&txn.thread)
    .bind(&txn.query)
    .bind(start.map(|(m, _)| m))
    .bind(start.map(|(_, o)| o))
    .bind(wait.map(|(m, _)| m))
    .bind(wait.map(|(_, o)| o))
    .bind(&txn.lock_mode)
    .bind(&txn.lock_type)
    .bind(&txn.lock_table)
    .bind(&txn.lock_index)
    .bind(&txn.lock_data)
    .execute(exec)
    .await
    .map_err(|e| SinkError::from_insert("transaction", &txn.id, e))?;

    Ok(())
}

/// Get a transaction by source id
pub async fn get_transaction<'e, E>(exec: E, id: &str) -> Result<Option<Transaction>, SinkError>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query_as::<_, TransactionTuple>(
        r#"
        SELECT id, thread, query, start_time, start_time_offset, wait_start_time, wait_start_time_offset,
               lock_mode, lock_type, lock_table, lock_index, lock_data
        FROM transactions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(exec)
    .await?;

    Ok(row.map(
        |(
            id,
            thread,
            query,
            start_time,
            start_offset,
            wait_start_time,
            wait_offset,
            lock_mode,
            lock_type,
            lock_table,
            lock_index,
            lock_data,
        )| Transaction {
            id,
            thread,
            query,
            start_time: zoned(start_time, start_offset),
            wait_start_time: zoned(wait_start_time, wait_offset),
            lock_mode,
            lock_type,
            lock_table,
            lock_index,
            lock_data,
        },
    ))
}

pub async fn transaction_exists<'e, E>(exec: E, id: &str) -> Result<bool, SinkError>
where
    E: SqliteExecutor<'e>,
{
    let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM transactions WHERE id = ?")
        .bind(id)
        .fetch_one(exec)
        .await?;
    Ok(exists)
}

/// Insert `txn` unless a transaction with its id is already stored
///
/// The first observation of a transaction wins. Returns whether a row was
/// written.
pub async fn ensure_transaction(
    conn: &mut SqliteConnection,
    txn: &Transaction,
) -> Result<bool, SinkError> {
    if transaction_exists(&mut *conn, &txn.id).await? {
        return Ok(false);
    }
    insert_transaction(&mut *conn, txn).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::SinkService;
    use crate::data::sqlite::repositories::test_support::sample_transaction;

    #[tokio::test]
    async fn test_insert_and_get_transaction() {
        let sink = SinkService::in_memory().await.unwrap();
        let txn = sample_transaction("285543496076");

        insert_transaction(sink.pool(), &txn).await.unwrap();
        let stored = get_transaction(sink.pool(), "285543496076")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(stored, txn);
        assert_eq!(stored.lock_table, "`schema`.`table`");
        assert_eq!(
            stored.wait_start_time.unwrap().to_rfc3339(),
            "2019-03-18T02:43:01+00:00"
        );
        assert!(transaction_exists(sink.pool(), "285543496076").await.unwrap());
    }

    #[tokio::test]
    async fn test_transaction_without_times() {
        let sink = SinkService::in_memory().await.unwrap();
        let mut txn = sample_transaction("1");
        txn.start_time = None;
        txn.wait_start_time = None;

        insert_transaction(sink.pool(), &txn).await.unwrap();
        let stored = get_transaction(sink.pool(), "1").await.unwrap().unwrap();
        assert!(stored.start_time.is_none());
        assert!(stored.wait_start_time.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id_is_constraint_error() {
        let sink = SinkService::in_memory().await.unwrap();
        let txn = sample_transaction("dup");

        insert_transaction(sink.pool(), &txn).await.unwrap();
        let err = insert_transaction(sink.pool(), &txn).await.unwrap_err();
        assert!(matches!(err, SinkError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_wait_before_start_rejected() {
        let sink = SinkService::in_memory().await.unwrap();
        let mut txn = sample_transaction("bad");
        txn.wait_start_time = txn.start_time.map(|t| t - chrono::Duration::seconds(1));

        let err = insert_transaction(sink.pool(), &txn).await.unwrap_err();
        assert!(matches!(err, SinkError::Constraint(_)));
        assert!(!transaction_exists(sink.pool(), "bad").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_transaction() {
        let sink = SinkService::in_memory().await.unwrap();
        assert!(get_transaction(sink.pool(), "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ensure_transaction_keeps_first_observation() {
        let sink = SinkService::in_memory().await.unwrap();
        let first = sample_transaction("285543496076");
        let mut later = first.clone();
        later.lock_mode = "S".to_string();

        let inserted = sink
            .with_handle(move |conn| {
                Box::pin(async move {
                    let a = ensure_transaction(&mut *conn, &first).await?;
                    let b = ensure_transaction(&mut *conn, &later).await?;
                    Ok((a, b))
                })
            })
            .await
            .unwrap();

        assert_eq!(inserted, (true, false));
        let stored = get_transaction(sink.pool(), "285543496076")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.lock_mode, "X");
    }
}
