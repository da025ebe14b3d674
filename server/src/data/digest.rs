//! Query digest deduplication
//!
//! Repeated query shapes share one `query_attributes` row keyed by the SHA-256
//! of their digest text. Attaching a digest is set-if-absent followed by a
//! back-reference from the user query, both inside one transaction.
//! `store_user_query` also folds the user query insert into that transaction.

use sqlx::sqlite::SqliteConnection;

use crate::data::sqlite::repositories::{
    set_digest_hash, upsert_query_attribute, upsert_user_query,
};
use crate::data::sqlite::{SinkError, SinkService};
use crate::data::types::{QueryAttribute, UserQuery};
use crate::utils::crypto::sha256_hex;

/// Digest form of a query. Literals and structure are kept verbatim.
pub fn normalize(query: &str) -> &str {
    query.trim()
}

/// Content hash of a digest: 64 lowercase hex characters
pub fn content_hash(digest: &str) -> String {
    sha256_hex(digest)
}

/// Store the digest of `query` unless an identical one exists
pub async fn ensure_attribute(
    conn: &mut SqliteConnection,
    query: &str,
) -> Result<QueryAttribute, SinkError> {
    let digest = normalize(query);
    let digest_hash = content_hash(digest);
    let id = upsert_query_attribute(&mut *conn, digest, &digest_hash).await?;

    Ok(QueryAttribute {
        id,
        digest: digest.to_string(),
        digest_hash,
    })
}

/// Attach the digest of `query` to user query `user_query_id`
///
/// Returns the attribute id, or `None` when the user query does not exist. In
/// that case nothing is written.
pub async fn attach_digest(
    sink: &SinkService,
    user_query_id: i64,
    query: &str,
) -> Result<Option<i64>, SinkError> {
    let query = query.to_string();

    let result = sink
        .with_handle(move |conn| {
            Box::pin(async move {
                let attribute = ensure_attribute(&mut *conn, &query).await?;
                if !set_digest_hash(&mut *conn, user_query_id, &attribute.digest_hash).await? {
                    return Err(SinkError::not_found("user_query", user_query_id));
                }
                Ok(attribute.id)
            })
        })
        .await;

    match result {
        Ok(id) => Ok(Some(id)),
        Err(SinkError::NotFound {
            entity: "user_query",
            ..
        }) => {
            tracing::debug!(user_query_id, "Digest not attached, user query missing");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Store a user query together with its digest in one transaction
///
/// Returns the user query id. Storing the same record again returns the id
/// of the first copy, so a re-run window writes nothing new. A failure leaves
/// neither the row nor the digest behind.
pub async fn store_user_query(sink: &SinkService, query: &UserQuery) -> Result<i64, SinkError> {
    let query = query.clone();

    sink.with_handle(move |conn| {
        Box::pin(async move {
            let mut query = query;
            let attribute = ensure_attribute(&mut *conn, &query.query).await?;
            query.digest_hash = Some(attribute.digest_hash);
            upsert_user_query(&mut *conn, &query).await
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::repositories::test_support::sample_user_query;
    use crate::data::sqlite::repositories::{
        count_query_attributes, insert_user_query, select_user_query,
    };
    use std::sync::Arc;

    #[test]
    fn test_content_hash_is_deterministic() {
        let digest = "SELECT `A`, `B`\nFROM `D`\nWHERE `C` = ?";
        assert_eq!(content_hash(digest), content_hash(digest));
        assert_eq!(
            content_hash(digest),
            "bbdd1e7260fdd5fc159a12248d059e4a1a294ecd52c8287ed2e71708908dd142"
        );
        assert_ne!(content_hash(digest), content_hash("SELECT 1"));
    }

    #[test]
    fn test_normalize_keeps_literals() {
        assert_eq!(
            normalize("  SELECT * FROM t WHERE id = 45\n"),
            "SELECT * FROM t WHERE id = 45"
        );
    }

    #[tokio::test]
    async fn test_attach_digest_sets_back_reference() {
        let sink = SinkService::in_memory().await.unwrap();
        let query = sample_user_query();
        let id = insert_user_query(sink.pool(), &query).await.unwrap();

        let attribute_id = attach_digest(&sink, id, &query.query).await.unwrap();
        assert!(attribute_id.is_some());

        let stored = select_user_query(sink.pool(), id).await.unwrap().unwrap();
        assert_eq!(
            stored.digest_hash.as_deref(),
            Some("bbdd1e7260fdd5fc159a12248d059e4a1a294ecd52c8287ed2e71708908dd142")
        );
        assert_eq!(stored.query, query.query);
    }

    #[tokio::test]
    async fn test_identical_queries_share_one_digest() {
        let sink = SinkService::in_memory().await.unwrap();
        let query = sample_user_query();
        let mut other_connection = sample_user_query();
        other_connection.connection_id = "311270894".to_string();
        let first = insert_user_query(sink.pool(), &query).await.unwrap();
        let second = insert_user_query(sink.pool(), &other_connection)
            .await
            .unwrap();

        let a = attach_digest(&sink, first, &query.query).await.unwrap();
        let b = attach_digest(&sink, second, &query.query).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(count_query_attributes(sink.pool()).await.unwrap(), 1);

        let first = select_user_query(sink.pool(), first).await.unwrap().unwrap();
        let second = select_user_query(sink.pool(), second).await.unwrap().unwrap();
        assert_eq!(first.digest_hash, second.digest_hash);
    }

    #[tokio::test]
    async fn test_missing_user_query_writes_nothing() {
        let sink = SinkService::in_memory().await.unwrap();

        let result = attach_digest(&sink, 404, "SELECT 1").await.unwrap();
        assert!(result.is_none());
        assert_eq!(count_query_attributes(sink.pool()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_writers_converge_on_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(SinkService::init(&dir.path().join("mart.db")).await.unwrap());
        let query = sample_user_query();

        let mut ids = Vec::new();
        for connection in 0..8 {
            let mut query = query.clone();
            query.connection_id = connection.to_string();
            ids.push(insert_user_query(sink.pool(), &query).await.unwrap());
        }

        let handles: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let sink = Arc::clone(&sink);
                let text = query.query.clone();
                tokio::spawn(async move { attach_digest(&sink, id, &text).await })
            })
            .collect();

        let mut attribute_ids = Vec::new();
        for handle in handles {
            attribute_ids.push(handle.await.unwrap().unwrap());
        }

        attribute_ids.dedup();
        assert_eq!(attribute_ids.len(), 1);
        assert_eq!(count_query_attributes(sink.pool()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_user_query_is_idempotent() {
        let sink = SinkService::in_memory().await.unwrap();
        let query = sample_user_query();

        let first = store_user_query(&sink, &query).await.unwrap();
        let again = store_user_query(&sink, &query).await.unwrap();
        assert_eq!(first, again);

        let stored = select_user_query(sink.pool(), first).await.unwrap().unwrap();
        assert_eq!(stored.query, query.query);
        assert!(stored.digest_hash.is_some());
        assert_eq!(count_query_attributes(sink.pool()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_user_query_failure_writes_nothing() {
        let sink = SinkService::in_memory().await.unwrap();
        let mut query = sample_user_query();
        query.lock_time = f64::NAN;

        let err = store_user_query(&sink, &query).await.unwrap_err();
        assert!(matches!(err, SinkError::Constraint(_)));
        assert_eq!(count_query_attributes(sink.pool()).await.unwrap(), 0);
    }
}
