//! SinkRepository implementation for SQLite
//!
//! Delegates to the free functions in `repositories`, wrapping multi-row
//! writes in a scoped transaction.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::data::digest;
use crate::data::traits::SinkRepository;
use crate::data::types::{BadQuery, ConnectionSample, LockEvent, UserQuery};

use super::repositories::{
    ensure_transaction, insert_bad_query, insert_connection_sample, insert_lock_wait,
    insert_long_txn, select_bad_queries,
};
use super::{SinkError, SinkService};

#[async_trait]
impl SinkRepository for Arc<SinkService> {
    async fn store_user_query(&self, query: &UserQuery) -> Result<i64, SinkError> {
        digest::store_user_query(self, query).await
    }

    async fn record_bad_query(
        &self,
        query: &UserQuery,
        labels: Vec<String>,
    ) -> Result<i64, SinkError> {
        let query = query.clone();

        self.with_handle(move |conn| {
            Box::pin(async move {
                let attribute = digest::ensure_attribute(&mut *conn, &query.query).await?;
                let row = BadQuery {
                    id: None,
                    log_time: query.log_time,
                    user_host: query.user_host,
                    connection_id: query.connection_id,
                    query_time: query.query_time,
                    digest_hash: attribute.digest_hash,
                    labels,
                };
                insert_bad_query(&mut *conn, &row).await
            })
        })
        .await
    }

    async fn record_lock_event(&self, event: &LockEvent) -> Result<i64, SinkError> {
        let event = event.clone();

        self.with_handle(move |conn| {
            Box::pin(async move {
                for txn in event.transactions() {
                    ensure_transaction(&mut *conn, txn).await?;
                }
                match &event {
                    LockEvent::Wait { wait, .. } => insert_lock_wait(&mut *conn, wait).await,
                    LockEvent::LongRunning { long_txn, .. } => {
                        insert_long_txn(&mut *conn, long_txn).await
                    }
                }
            })
        })
        .await
    }

    async fn insert_connection_sample(&self, sample: &ConnectionSample) -> Result<i64, SinkError> {
        insert_connection_sample(self.pool(), sample).await
    }

    async fn list_bad_queries(
        &self,
        start: &DateTime<Utc>,
        end: &DateTime<Utc>,
    ) -> Result<Vec<BadQuery>, SinkError> {
        select_bad_queries(self.pool(), start, end).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::repositories::test_support::{
        observed_at, sample_transaction, sample_user_query,
    };
    use crate::data::sqlite::repositories::{
        count_query_attributes, select_lock_waits, select_long_txns, transaction_exists,
    };
    use crate::data::types::{InnodbLockWait, LongTxn};

    #[tokio::test]
    async fn test_record_bad_query_stores_digest_and_row() {
        let sink = Arc::new(SinkService::in_memory().await.unwrap());
        let query = sample_user_query();

        sink.record_bad_query(&query, vec!["TOO_MANY_JOINS".to_string()])
            .await
            .unwrap();
        sink.record_bad_query(&query, vec!["TOO_MANY_JOINS".to_string()])
            .await
            .unwrap();

        assert_eq!(count_query_attributes(sink.pool()).await.unwrap(), 1);

        let start = query.log_time.with_timezone(&Utc) - chrono::Duration::minutes(1);
        let end = query.log_time.with_timezone(&Utc) + chrono::Duration::minutes(1);
        let rows = sink.list_bad_queries(&start, &end).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].labels, vec!["TOO_MANY_JOINS".to_string()]);
    }

    #[tokio::test]
    async fn test_record_bad_query_without_labels_rolls_back() {
        let sink = Arc::new(SinkService::in_memory().await.unwrap());

        let err = sink
            .record_bad_query(&sample_user_query(), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Constraint(_)));
        assert_eq!(count_query_attributes(sink.pool()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_user_query_through_trait() {
        let sink = Arc::new(SinkService::in_memory().await.unwrap());
        let query = sample_user_query();

        let id = sink.store_user_query(&query).await.unwrap();
        assert_eq!(sink.store_user_query(&query).await.unwrap(), id);
        assert_eq!(count_query_attributes(sink.pool()).await.unwrap(), 1);
    }

    fn wait_event(waiting: &str, blocking: &str) -> LockEvent {
        LockEvent::Wait {
            wait: InnodbLockWait {
                id: None,
                log_time: observed_at(),
                waiting_id: waiting.to_string(),
                blocking_id: blocking.to_string(),
            },
            waiting: sample_transaction(waiting),
            blocking: sample_transaction(blocking),
        }
    }

    #[tokio::test]
    async fn test_record_lock_wait_stores_both_transactions() {
        let sink = Arc::new(SinkService::in_memory().await.unwrap());

        let id = sink
            .record_lock_event(&wait_event("waiting", "blocking"))
            .await
            .unwrap();

        assert!(transaction_exists(sink.pool(), "waiting").await.unwrap());
        assert!(transaction_exists(sink.pool(), "blocking").await.unwrap());
        let start = observed_at() - chrono::Duration::minutes(1);
        let end = observed_at() + chrono::Duration::minutes(1);
        let rows = select_lock_waits(sink.pool(), &start, &end).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, Some(id));
    }

    #[tokio::test]
    async fn test_record_lock_events_share_transactions() {
        let sink = Arc::new(SinkService::in_memory().await.unwrap());

        sink.record_lock_event(&wait_event("a", "b")).await.unwrap();
        sink.record_lock_event(&wait_event("c", "b")).await.unwrap();
        sink.record_lock_event(&LockEvent::LongRunning {
            long_txn: LongTxn {
                id: None,
                log_time: observed_at(),
                transaction_id: "b".to_string(),
            },
            transaction: sample_transaction("b"),
        })
        .await
        .unwrap();

        let start = observed_at();
        let end = observed_at() + chrono::Duration::seconds(1);
        assert_eq!(select_lock_waits(sink.pool(), &start, &end).await.unwrap().len(), 2);
        let long = select_long_txns(sink.pool(), &start, &end).await.unwrap();
        assert_eq!(long.len(), 1);
        assert_eq!(long[0].transaction_id, "b");
    }

    #[tokio::test]
    async fn test_record_lock_event_rolls_back_on_bad_transaction() {
        let sink = Arc::new(SinkService::in_memory().await.unwrap());
        let mut event = wait_event("waiting", "blocking");
        if let LockEvent::Wait { blocking, .. } = &mut event {
            blocking.wait_start_time = blocking
                .start_time
                .map(|t| t - chrono::Duration::seconds(1));
        }

        let err = sink.record_lock_event(&event).await.unwrap_err();
        assert!(matches!(err, SinkError::Constraint(_)));
        assert!(!transaction_exists(sink.pool(), "waiting").await.unwrap());
    }
}
