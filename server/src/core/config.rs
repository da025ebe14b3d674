use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::jobs::WindowPolicy;
use crate::domain::planner::{AntiPattern, CatalogMode};
use crate::utils::file::expand_path;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_BAD_QUERIES_FREQUENCY_MIN,
    DEFAULT_CONNECTIONS_FREQUENCY_MIN, DEFAULT_JOB_DELAY_MIN, DEFAULT_JOIN_THRESHOLD,
    DEFAULT_LOCKS_FREQUENCY_MIN, DEFAULT_LONG_TXN_SECS, DEFAULT_MAX_FAILURE_RATIO,
    DEFAULT_QUERY_STATS_FREQUENCY_MIN,
};

// =============================================================================
// Source Kind Enum
// =============================================================================

/// Database the jobs extract from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// `stl_query` / `stv_sessions` over the Postgres wire protocol
    #[default]
    Redshift,
    /// MySQL slow-query-log file
    SlowLog,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Redshift => write!(f, "redshift"),
            SourceKind::SlowLog => write!(f, "slow_log"),
        }
    }
}

// =============================================================================
// File Config Structs (JSON deserialization)
// =============================================================================

/// Sink configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SinkFileConfig {
    pub path: Option<String>,
}

/// Source configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SourceFileConfig {
    pub kind: Option<SourceKind>,
    pub url: Option<String>,
    pub path: Option<String>,
}

/// Schema catalog configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct CatalogFileConfig {
    pub path: Option<String>,
    pub mode: Option<CatalogMode>,
}

/// Schedule of one job (nested under jobs)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct JobFileConfig {
    pub enabled: Option<bool>,
    pub frequency_minutes: Option<u64>,
    pub delay_minutes: Option<u64>,
}

/// Bad queries job (nested under jobs)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BadQueriesFileConfig {
    pub enabled: Option<bool>,
    pub frequency_minutes: Option<u64>,
    pub delay_minutes: Option<u64>,
    /// Anti-pattern labels that get a query stored
    pub labels: Option<Vec<String>>,
    pub join_threshold: Option<usize>,
}

/// Locks job (nested under jobs)
#[derive(Debug, Default, Clone, Deserialize)]
pub struct LocksFileConfig {
    pub enabled: Option<bool>,
    pub frequency_minutes: Option<u64>,
    pub delay_minutes: Option<u64>,
    pub long_txn_seconds: Option<u64>,
}

/// Jobs configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct JobsFileConfig {
    pub window_policy: Option<WindowPolicy>,
    pub query_stats: Option<JobFileConfig>,
    pub bad_queries: Option<BadQueriesFileConfig>,
    pub connections: Option<JobFileConfig>,
    pub locks: Option<LocksFileConfig>,
}

/// Health configuration section
#[derive(Debug, Default, Clone, Deserialize)]
pub struct HealthFileConfig {
    pub max_failure_ratio: Option<f64>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub sink: Option<SinkFileConfig>,
    pub source: Option<SourceFileConfig>,
    pub catalog: Option<CatalogFileConfig>,
    pub jobs: Option<JobsFileConfig>,
    pub health: Option<HealthFileConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

/// Replace `current` when `value` is set
fn overlay<T: fmt::Debug>(current: &mut Option<T>, value: Option<T>, field: &str) {
    if value.is_some() {
        tracing::trace!(field, value = ?value, "Merging config value");
        *current = value;
    }
}

impl JobFileConfig {
    fn merge(&mut self, other: JobFileConfig, section: &str) {
        overlay(&mut self.enabled, other.enabled, section);
        overlay(&mut self.frequency_minutes, other.frequency_minutes, section);
        overlay(&mut self.delay_minutes, other.delay_minutes, section);
    }
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(sink) = other.sink {
            let current = self.sink.get_or_insert_with(SinkFileConfig::default);
            overlay(&mut current.path, sink.path, "sink.path");
        }

        if let Some(source) = other.source {
            let current = self.source.get_or_insert_with(SourceFileConfig::default);
            overlay(&mut current.kind, source.kind, "source.kind");
            overlay(&mut current.url, source.url, "source.url");
            overlay(&mut current.path, source.path, "source.path");
        }

        if let Some(catalog) = other.catalog {
            let current = self.catalog.get_or_insert_with(CatalogFileConfig::default);
            overlay(&mut current.path, catalog.path, "catalog.path");
            overlay(&mut current.mode, catalog.mode, "catalog.mode");
        }

        // Jobs (with nested per-job sections)
        if let Some(jobs) = other.jobs {
            let current = self.jobs.get_or_insert_with(JobsFileConfig::default);
            overlay(&mut current.window_policy, jobs.window_policy, "jobs.window_policy");

            if let Some(stats) = jobs.query_stats {
                current
                    .query_stats
                    .get_or_insert_with(JobFileConfig::default)
                    .merge(stats, "jobs.query_stats");
            }
            if let Some(connections) = jobs.connections {
                current
                    .connections
                    .get_or_insert_with(JobFileConfig::default)
                    .merge(connections, "jobs.connections");
            }
            if let Some(locks) = jobs.locks {
                let current_locks = current.locks.get_or_insert_with(LocksFileConfig::default);
                overlay(&mut current_locks.enabled, locks.enabled, "jobs.locks.enabled");
                overlay(
                    &mut current_locks.frequency_minutes,
                    locks.frequency_minutes,
                    "jobs.locks.frequency_minutes",
                );
                overlay(
                    &mut current_locks.delay_minutes,
                    locks.delay_minutes,
                    "jobs.locks.delay_minutes",
                );
                overlay(
                    &mut current_locks.long_txn_seconds,
                    locks.long_txn_seconds,
                    "jobs.locks.long_txn_seconds",
                );
            }
            if let Some(bad) = jobs.bad_queries {
                let current_bad = current
                    .bad_queries
                    .get_or_insert_with(BadQueriesFileConfig::default);
                overlay(&mut current_bad.enabled, bad.enabled, "jobs.bad_queries.enabled");
                overlay(
                    &mut current_bad.frequency_minutes,
                    bad.frequency_minutes,
                    "jobs.bad_queries.frequency_minutes",
                );
                overlay(
                    &mut current_bad.delay_minutes,
                    bad.delay_minutes,
                    "jobs.bad_queries.delay_minutes",
                );
                overlay(&mut current_bad.labels, bad.labels, "jobs.bad_queries.labels");
                overlay(
                    &mut current_bad.join_threshold,
                    bad.join_threshold,
                    "jobs.bad_queries.join_threshold",
                );
            }
        }

        if let Some(health) = other.health {
            let current = self.health.get_or_insert_with(HealthFileConfig::default);
            overlay(
                &mut current.max_failure_ratio,
                health.max_failure_ratio,
                "health.max_failure_ratio",
            );
        }
    }
}

// =============================================================================
// Final Config Structs
// =============================================================================

/// Sink database location; `None` means `<data dir>/mart.db`
#[derive(Debug, Clone, Default)]
pub struct SinkConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub url: Option<String>,
    pub path: Option<PathBuf>,
}

/// Without a path the catalog is empty and every table is unknown
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub path: Option<PathBuf>,
    pub mode: CatalogMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    pub enabled: bool,
    pub frequency: Duration,
    pub delay: Duration,
}

impl JobConfig {
    fn from_file(
        enabled: Option<bool>,
        frequency: Option<u64>,
        delay: Option<u64>,
        default_frequency: u64,
    ) -> Self {
        Self {
            enabled: enabled.unwrap_or(true),
            frequency: Duration::from_secs(frequency.unwrap_or(default_frequency) * 60),
            delay: Duration::from_secs(delay.unwrap_or(DEFAULT_JOB_DELAY_MIN) * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BadQueriesConfig {
    pub job: JobConfig,
    pub labels: BTreeSet<AntiPattern>,
    pub join_threshold: usize,
}

#[derive(Debug, Clone)]
pub struct LocksConfig {
    pub job: JobConfig,
    /// Open transactions at least this old are recorded as long running
    pub long_txn_after: Duration,
}

#[derive(Debug, Clone)]
pub struct JobsConfig {
    pub window_policy: WindowPolicy,
    pub query_stats: JobConfig,
    pub bad_queries: BadQueriesConfig,
    pub connections: JobConfig,
    pub locks: LocksConfig,
}

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub max_failure_ratio: f64,
}

/// Final merged application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sink: SinkConfig,
    pub source: SourceConfig,
    pub catalog: CatalogConfig,
    pub jobs: JobsConfig,
    pub health: HealthConfig,
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.mart/mart.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        // 1. Load from profile dir (~/.mart/mart.json) - skip if not exists
        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        // 2. Load from CLI-specified path OR local directory
        let overlay_path = if let Some(ref path) = cli.config {
            let expanded = expand_path(&path.to_string_lossy());
            if !expanded.exists() {
                anyhow::bail!("Config file not found: {}", expanded.display());
            }
            Some(expanded)
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        Self::resolve(file_config, cli)
    }

    /// Layer defaults, merged file config and CLI/env overrides
    fn resolve(file_config: FileConfig, cli: &CliConfig) -> Result<Self> {
        let file_sink = file_config.sink.unwrap_or_default();
        let file_source = file_config.source.unwrap_or_default();
        let file_catalog = file_config.catalog.unwrap_or_default();
        let file_jobs = file_config.jobs.unwrap_or_default();
        let file_stats = file_jobs.query_stats.unwrap_or_default();
        let file_bad = file_jobs.bad_queries.unwrap_or_default();
        let file_connections = file_jobs.connections.unwrap_or_default();
        let file_locks = file_jobs.locks.unwrap_or_default();
        let file_health = file_config.health.unwrap_or_default();

        let sink = SinkConfig {
            path: cli
                .sink_path
                .clone()
                .or_else(|| file_sink.path.map(|p| expand_path(&p))),
        };

        let source = SourceConfig {
            kind: cli.source_kind.or(file_source.kind).unwrap_or_default(),
            url: cli.source_url.clone().or(file_source.url),
            path: cli
                .source_path
                .clone()
                .or_else(|| file_source.path.map(|p| expand_path(&p))),
        };

        let catalog = CatalogConfig {
            path: cli
                .catalog_path
                .clone()
                .or_else(|| file_catalog.path.map(|p| expand_path(&p))),
            mode: cli.catalog_mode.or(file_catalog.mode).unwrap_or_default(),
        };

        // Labels: unknown names are rejected, an empty list means the default
        let mut labels = BTreeSet::new();
        for name in file_bad.labels.unwrap_or_default() {
            let label = AntiPattern::parse(&name).with_context(|| {
                format!(
                    "Configuration error: unknown anti-pattern label '{}' in jobs.bad_queries.labels",
                    name
                )
            })?;
            labels.insert(label);
        }
        if labels.is_empty() {
            labels.insert(AntiPattern::TooManyJoins);
        }

        let jobs = JobsConfig {
            window_policy: cli
                .window_policy
                .or(file_jobs.window_policy)
                .unwrap_or_default(),
            query_stats: JobConfig::from_file(
                file_stats.enabled,
                file_stats.frequency_minutes,
                file_stats.delay_minutes,
                DEFAULT_QUERY_STATS_FREQUENCY_MIN,
            ),
            bad_queries: BadQueriesConfig {
                job: JobConfig::from_file(
                    file_bad.enabled,
                    file_bad.frequency_minutes,
                    file_bad.delay_minutes,
                    DEFAULT_BAD_QUERIES_FREQUENCY_MIN,
                ),
                labels,
                join_threshold: cli
                    .join_threshold
                    .or(file_bad.join_threshold)
                    .unwrap_or(DEFAULT_JOIN_THRESHOLD),
            },
            connections: JobConfig::from_file(
                file_connections.enabled,
                file_connections.frequency_minutes,
                file_connections.delay_minutes,
                DEFAULT_CONNECTIONS_FREQUENCY_MIN,
            ),
            locks: LocksConfig {
                job: JobConfig::from_file(
                    file_locks.enabled,
                    file_locks.frequency_minutes,
                    file_locks.delay_minutes,
                    DEFAULT_LOCKS_FREQUENCY_MIN,
                ),
                long_txn_after: Duration::from_secs(
                    file_locks.long_txn_seconds.unwrap_or(DEFAULT_LONG_TXN_SECS),
                ),
            },
        };

        let health = HealthConfig {
            max_failure_ratio: file_health
                .max_failure_ratio
                .unwrap_or(DEFAULT_MAX_FAILURE_RATIO),
        };

        let config = Self {
            sink,
            source,
            catalog,
            jobs,
            health,
        };
        config.validate()?;

        tracing::debug!(
            source = %config.source.kind,
            catalog_mode = ?config.catalog.mode,
            window_policy = ?config.jobs.window_policy,
            join_threshold = config.jobs.bad_queries.join_threshold,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Validate the configuration for consistency and correctness
    fn validate(&self) -> Result<()> {
        for (name, job) in [
            ("query_stats", &self.jobs.query_stats),
            ("bad_queries", &self.jobs.bad_queries.job),
            ("connections", &self.jobs.connections),
            ("locks", &self.jobs.locks.job),
        ] {
            // A zero period would spin the scheduler
            if job.enabled && job.frequency.is_zero() {
                anyhow::bail!(
                    "Configuration error: jobs.{}.frequency_minutes must be greater than 0",
                    name
                );
            }
        }

        let locks = &self.jobs.locks;
        if locks.job.enabled && locks.long_txn_after.is_zero() {
            anyhow::bail!(
                "Configuration error: jobs.locks.long_txn_seconds must be greater than 0"
            );
        }

        let ratio = self.health.max_failure_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            anyhow::bail!(
                "Configuration error: health.max_failure_ratio must be between 0 and 1 (got {})",
                ratio
            );
        }

        if let Some(url) = &self.source.url
            && url.trim().is_empty()
        {
            anyhow::bail!("Configuration error: source.url must not be empty");
        }

        Ok(())
    }

    /// Whether any scheduled job reads from the source
    pub fn any_job_enabled(&self) -> bool {
        self.jobs.query_stats.enabled
            || self.jobs.bad_queries.job.enabled
            || self.jobs.connections.enabled
            || self.jobs.locks.job.enabled
    }
}

/// Get the profile config path (~/.mart/mart.json)
fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}
