//! Query digest repository

use sqlx::sqlite::SqliteExecutor;

use crate::data::sqlite::SinkError;
use crate::data::types::QueryAttribute;
use crate::utils::crypto::is_sha256_hex;

/// Insert a digest or return the id of the row already holding its hash
///
/// The UNIQUE constraint on `digest_hash` serializes concurrent writers: the
/// no-op `DO UPDATE` makes `RETURNING` yield the existing id on conflict.
pub async fn upsert_query_attribute<'e, E>(
    exec: E,
    digest: &str,
    digest_hash: &str,
) -> Result<i64, SinkError>
where
    E: SqliteExecutor<'e>,
{
    if !is_sha256_hex(digest_hash) {
        return Err(SinkError::Constraint(format!(
            "query_attribute: malformed digest hash '{}'",
            digest_hash
        )));
    }

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO query_attributes (digest, digest_hash)
        VALUES (?, ?)
        ON CONFLICT(digest_hash) DO UPDATE SET digest_hash = excluded.digest_hash
        RETURNING id
        "#,
    )
    .bind(digest)
    .bind(digest_hash)
    .fetch_one(exec)
    .await?;

    Ok(id)
}

/// Get a digest by its content hash
pub async fn get_query_attribute_by_hash<'e, E>(
    exec: E,
    digest_hash: &str,
) -> Result<Option<QueryAttribute>, SinkError>
where
    E: SqliteExecutor<'e>,
{
    let row = sqlx::query_as::<_, (i64, String, String)>(
        "SELECT id, digest, digest_hash FROM query_attributes WHERE digest_hash = ?",
    )
    .bind(digest_hash)
    .fetch_optional(exec)
    .await?;

    Ok(row.map(|(id, digest, digest_hash)| QueryAttribute {
        id,
        digest,
        digest_hash,
    }))
}

pub async fn count_query_attributes<'e, E>(exec: E) -> Result<i64, SinkError>
where
    E: SqliteExecutor<'e>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM query_attributes")
        .fetch_one(exec)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::SinkService;
    use crate::utils::crypto::sha256_hex;

    #[tokio::test]
    async fn test_upsert_returns_same_id_for_same_hash() {
        let sink = SinkService::in_memory().await.unwrap();
        let digest = "SELECT `A`, `B`\nFROM `D`\nWHERE `C` = ?";
        let hash = sha256_hex(digest);

        let first = upsert_query_attribute(sink.pool(), digest, &hash)
            .await
            .unwrap();
        let second = upsert_query_attribute(sink.pool(), digest, &hash)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(count_query_attributes(sink.pool()).await.unwrap(), 1);

        let stored = get_query_attribute_by_hash(sink.pool(), &hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.id, first);
        assert_eq!(stored.digest, digest);
        assert_eq!(
            stored.digest_hash,
            "bbdd1e7260fdd5fc159a12248d059e4a1a294ecd52c8287ed2e71708908dd142"
        );
    }

    #[tokio::test]
    async fn test_distinct_digests_get_distinct_rows() {
        let sink = SinkService::in_memory().await.unwrap();

        let a = upsert_query_attribute(sink.pool(), "SELECT 1", &sha256_hex("SELECT 1"))
            .await
            .unwrap();
        let b = upsert_query_attribute(sink.pool(), "SELECT 2", &sha256_hex("SELECT 2"))
            .await
            .unwrap();

        assert_ne!(a, b);
        assert_eq!(count_query_attributes(sink.pool()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_malformed_hash_rejected() {
        let sink = SinkService::in_memory().await.unwrap();
        let err = upsert_query_attribute(sink.pool(), "SELECT 1", "nothex")
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_get_unknown_hash() {
        let sink = SinkService::in_memory().await.unwrap();
        let found = get_query_attribute_by_hash(sink.pool(), &sha256_hex("nope"))
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
