//! SQLite sink schema
//!
//! Zoned timestamps use two columns: `<name>` holds UTC epoch microseconds and
//! `<name>_offset` the UTC offset in seconds. Range scans index the first.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 3;

/// Complete schema SQL
pub const SCHEMA: &str = r#"
-- =============================================================================
-- Infrastructure: Schema version tracking
-- =============================================================================
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at INTEGER NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at INTEGER NOT NULL,
    checksum TEXT NOT NULL,
    execution_time_ms INTEGER,
    success INTEGER NOT NULL DEFAULT 1
);

-- =============================================================================
-- 1. Query digests (must be before user_queries due to FK)
-- =============================================================================
CREATE TABLE IF NOT EXISTS query_attributes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    digest TEXT NOT NULL,
    digest_hash TEXT NOT NULL UNIQUE CHECK(length(digest_hash) = 64)
);

-- =============================================================================
-- 2. User queries
-- =============================================================================
CREATE TABLE IF NOT EXISTS user_queries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_host TEXT NOT NULL,
    ip_address TEXT NOT NULL,
    connection_id TEXT NOT NULL,
    query_time REAL NOT NULL CHECK(query_time >= 0),
    lock_time REAL NOT NULL CHECK(lock_time >= 0),
    rows_sent INTEGER NOT NULL,
    rows_examined INTEGER NOT NULL,
    log_time INTEGER NOT NULL,
    log_time_offset INTEGER NOT NULL,
    digest_hash TEXT REFERENCES query_attributes(digest_hash)
);

CREATE INDEX IF NOT EXISTS idx_user_queries_log_time ON user_queries(log_time);
-- One row per logged statement, so re-running a window writes nothing new
CREATE UNIQUE INDEX IF NOT EXISTS idx_user_queries_record
    ON user_queries(connection_id, log_time, digest_hash);

-- =============================================================================
-- 3. Transactions
-- =============================================================================
CREATE TABLE IF NOT EXISTS transactions (
    id TEXT PRIMARY KEY,
    thread TEXT NOT NULL,
    query TEXT NOT NULL,
    start_time INTEGER,
    start_time_offset INTEGER,
    wait_start_time INTEGER,
    wait_start_time_offset INTEGER,
    lock_mode TEXT NOT NULL DEFAULT '',
    lock_type TEXT NOT NULL DEFAULT '',
    lock_table TEXT NOT NULL DEFAULT '',
    lock_index TEXT NOT NULL DEFAULT '',
    lock_data TEXT NOT NULL DEFAULT '',
    CHECK(start_time IS NULL OR wait_start_time IS NULL OR wait_start_time >= start_time)
);

-- =============================================================================
-- 4. Lock waits and long transactions (reference transactions)
-- =============================================================================
CREATE TABLE IF NOT EXISTS lock_waits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    log_time INTEGER NOT NULL,
    log_time_offset INTEGER NOT NULL,
    waiting_id TEXT NOT NULL REFERENCES transactions(id),
    blocking_id TEXT NOT NULL REFERENCES transactions(id)
);

CREATE INDEX IF NOT EXISTS idx_lock_waits_log_time ON lock_waits(log_time);

CREATE TABLE IF NOT EXISTS long_txns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    log_time INTEGER NOT NULL,
    log_time_offset INTEGER NOT NULL,
    transaction_id TEXT NOT NULL REFERENCES transactions(id)
);

CREATE INDEX IF NOT EXISTS idx_long_txns_log_time ON long_txns(log_time);

-- =============================================================================
-- 5. Flagged queries
-- =============================================================================
CREATE TABLE IF NOT EXISTS bad_queries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    log_time INTEGER NOT NULL,
    log_time_offset INTEGER NOT NULL,
    user_host TEXT NOT NULL,
    connection_id TEXT NOT NULL,
    query_time REAL NOT NULL,
    digest_hash TEXT NOT NULL REFERENCES query_attributes(digest_hash),
    labels TEXT NOT NULL DEFAULT 'TOO_MANY_JOINS'
);

CREATE INDEX IF NOT EXISTS idx_bad_queries_log_time ON bad_queries(log_time);
CREATE UNIQUE INDEX IF NOT EXISTS idx_bad_queries_record
    ON bad_queries(connection_id, log_time, digest_hash);

-- =============================================================================
-- 6. Connection samples
-- =============================================================================
CREATE TABLE IF NOT EXISTS connections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    log_time INTEGER NOT NULL,
    log_time_offset INTEGER NOT NULL,
    count INTEGER NOT NULL CHECK(count >= 0)
);

CREATE INDEX IF NOT EXISTS idx_connections_log_time ON connections(log_time);
"#;

/// Version 2 labels flagged queries. Version 1 only ever stored join-count hits.
pub const MIGRATION_V2: &str =
    "ALTER TABLE bad_queries ADD COLUMN labels TEXT NOT NULL DEFAULT 'TOO_MANY_JOINS'";

/// Version 3 keys both query tables on `(connection_id, log_time, digest_hash)`.
/// Duplicates written by earlier re-runs are collapsed onto their first row.
pub const MIGRATION_V3: &str = r#"
DELETE FROM user_queries
WHERE digest_hash IS NOT NULL
  AND id NOT IN (
      SELECT MIN(id) FROM user_queries
      WHERE digest_hash IS NOT NULL
      GROUP BY connection_id, log_time, digest_hash
  );
CREATE UNIQUE INDEX IF NOT EXISTS idx_user_queries_record
    ON user_queries(connection_id, log_time, digest_hash);
DELETE FROM bad_queries
WHERE id NOT IN (
    SELECT MIN(id) FROM bad_queries GROUP BY connection_id, log_time, digest_hash
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_bad_queries_record
    ON bad_queries(connection_id, log_time, digest_hash)
"#;
