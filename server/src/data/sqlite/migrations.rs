//! Sink migration system
//!
//! A fresh database gets the full `SCHEMA` at `SCHEMA_VERSION`. Older databases
//! replay every step in `MIGRATIONS` above their recorded version.

use std::time::Instant;

use sqlx::SqlitePool;

use super::error::SinkError;
use super::schema::{MIGRATION_V2, MIGRATION_V3, SCHEMA, SCHEMA_VERSION};
use crate::utils::crypto::sha256_hex;

/// Incremental steps: (version, name, sql)
const MIGRATIONS: &[(i32, &str, &str)] = &[
    (2, "add_bad_query_labels", MIGRATION_V2),
    (3, "unique_query_records", MIGRATION_V3),
];

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SinkError> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        tracing::debug!(version = SCHEMA_VERSION, "Initializing sink schema");
        return apply_initial_schema(pool).await;
    }

    let current_version = current_version(pool).await?;
    if current_version >= SCHEMA_VERSION {
        tracing::debug!(version = current_version, "Sink schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        let Some((_, name, sql)) = MIGRATIONS.iter().find(|(v, _, _)| *v == version) else {
            return Err(SinkError::MigrationFailed {
                version,
                name: "unknown".to_string(),
                error: format!("No migration registered for version {}", version),
            });
        };
        apply_versioned_migration(pool, version, name, sql).await?;
    }

    Ok(())
}

/// Version recorded in `schema_version`, 0 when the row is missing
pub async fn current_version(pool: &SqlitePool) -> Result<i32, SinkError> {
    let version: Option<i32> = sqlx::query_scalar("SELECT version FROM schema_version WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

async fn apply_initial_schema(pool: &SqlitePool) -> Result<(), SinkError> {
    let start = Instant::now();
    let mut tx = pool.begin().await?;

    sqlx::query(SCHEMA).execute(&mut *tx).await?;

    let now = chrono::Utc::now().timestamp_micros();
    sqlx::query(
        "INSERT INTO schema_version (id, version, applied_at, description) VALUES (1, ?, ?, 'Initial schema')",
    )
    .bind(SCHEMA_VERSION)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    let elapsed_ms = start.elapsed().as_millis() as i64;
    record_migration(&mut tx, SCHEMA_VERSION, "initial_schema", SCHEMA, now, elapsed_ms).await?;

    tx.commit().await?;
    tracing::debug!(elapsed_ms, "Applied initial sink schema");
    Ok(())
}

async fn apply_versioned_migration(
    pool: &SqlitePool,
    version: i32,
    name: &str,
    sql: &str,
) -> Result<(), SinkError> {
    let start = Instant::now();
    let mut tx = pool.begin().await?;

    for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .map_err(|e| SinkError::MigrationFailed {
                version,
                name: name.to_string(),
                error: format!(
                    "Failed at statement: {} - {}",
                    &statement[..statement.len().min(50)],
                    e
                ),
            })?;
    }

    let now = chrono::Utc::now().timestamp_micros();
    sqlx::query("UPDATE schema_version SET version = ?, applied_at = ?, description = ? WHERE id = 1")
        .bind(version)
        .bind(now)
        .bind(name)
        .execute(&mut *tx)
        .await?;

    let elapsed_ms = start.elapsed().as_millis() as i64;
    record_migration(&mut tx, version, name, sql, now, elapsed_ms).await?;

    tx.commit().await?;
    tracing::debug!(version, name, elapsed_ms, "Applied sink migration");
    Ok(())
}

async fn record_migration(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    version: i32,
    name: &str,
    sql: &str,
    applied_at: i64,
    elapsed_ms: i64,
) -> Result<(), SinkError> {
    sqlx::query(
        "INSERT INTO schema_migrations (version, name, applied_at, checksum, execution_time_ms, success) VALUES (?, ?, ?, ?, ?, 1)",
    )
    .bind(version)
    .bind(name)
    .bind(applied_at)
    .bind(sha256_hex(sql))
    .bind(elapsed_ms)
    .execute(&mut **tx)
    .await?;
    Ok(())
}
