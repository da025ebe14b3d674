// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display and platform directories)
pub const APP_NAME: &str = "Mart";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "mart";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".mart";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "mart.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "MART_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "MART_LOG";

// =============================================================================
// Environment Variables - Storage
// =============================================================================

/// Environment variable to override data directory
pub const ENV_DATA_DIR: &str = "MART_DATA_DIR";

/// Environment variable for the sink database path
pub const ENV_SINK_PATH: &str = "MART_SINK_PATH";

// =============================================================================
// Environment Variables - Source
// =============================================================================

/// Environment variable for the source kind (redshift or slow_log)
pub const ENV_SOURCE_KIND: &str = "MART_SOURCE_KIND";

/// Environment variable for the Redshift connection URL
pub const ENV_SOURCE_URL: &str = "MART_SOURCE_URL";

/// Environment variable for the MySQL slow-log file path
pub const ENV_SOURCE_PATH: &str = "MART_SOURCE_PATH";

// =============================================================================
// Environment Variables - Planner
// =============================================================================

/// Environment variable for the schema catalog file
pub const ENV_CATALOG_PATH: &str = "MART_CATALOG_PATH";

/// Environment variable for the schema catalog mode (lenient or strict)
pub const ENV_CATALOG_MODE: &str = "MART_CATALOG_MODE";

/// Environment variable for the join-count threshold
pub const ENV_JOIN_THRESHOLD: &str = "MART_JOIN_THRESHOLD";

/// Environment variable for the cron window policy
pub const ENV_WINDOW_POLICY: &str = "MART_WINDOW_POLICY";

// =============================================================================
// SQLite Sink
// =============================================================================

/// Sink database filename (inside the data directory)
pub const SINK_DB_FILENAME: &str = "mart.db";

/// Maximum number of pooled sink connections
pub const SQLITE_MAX_CONNECTIONS: u32 = 8;

/// Busy timeout for sink writers (seconds)
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 5;

/// SQLite page cache size (negative = KiB)
pub const SQLITE_CACHE_SIZE: &str = "-16000";

// =============================================================================
// Redshift Source
// =============================================================================

/// Maximum number of pooled source connections
pub const SOURCE_MAX_CONNECTIONS: u32 = 4;

/// Source connection acquire timeout (seconds)
pub const SOURCE_ACQUIRE_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Jobs
// =============================================================================

/// Default cadence of the query stats job (minutes)
pub const DEFAULT_QUERY_STATS_FREQUENCY_MIN: u64 = 15;

/// Default cadence of the bad queries job (minutes)
pub const DEFAULT_BAD_QUERIES_FREQUENCY_MIN: u64 = 15;

/// Default cadence of the connections job (minutes)
pub const DEFAULT_CONNECTIONS_FREQUENCY_MIN: u64 = 5;

/// Default cadence of the locks job (minutes)
pub const DEFAULT_LOCKS_FREQUENCY_MIN: u64 = 5;

/// Age after which an open transaction is recorded as long running (seconds)
pub const DEFAULT_LONG_TXN_SECS: u64 = 300;

/// Default initial delay before a job's first run (minutes)
pub const DEFAULT_JOB_DELAY_MIN: u64 = 1;

/// Join count above which a query is labelled TOO_MANY_JOINS
pub const DEFAULT_JOIN_THRESHOLD: usize = 4;

/// Failure ratio above which a job reports unhealthy
pub const DEFAULT_MAX_FAILURE_RATIO: f64 = 0.25;

/// Interval between health reports of the running jobs (seconds)
pub const HEALTH_REPORT_INTERVAL_SECS: u64 = 300;

/// Metric name prefix
pub const METRIC_PREFIX: &str = "mart";

// =============================================================================
// Job Names
// =============================================================================

pub const JOB_QUERY_STATS: &str = "query_stats";
pub const JOB_BAD_QUERIES: &str = "bad_queries";
pub const JOB_CONNECTIONS: &str = "connections";
pub const JOB_LOCKS: &str = "locks";

// =============================================================================
// Shutdown
// =============================================================================

/// Timeout for graceful shutdown of job tasks (seconds)
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;
