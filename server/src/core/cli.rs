use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::SourceKind;
use super::constants::{
    ENV_CATALOG_MODE, ENV_CATALOG_PATH, ENV_CONFIG, ENV_JOIN_THRESHOLD, ENV_SINK_PATH,
    ENV_SOURCE_KIND, ENV_SOURCE_PATH, ENV_SOURCE_URL, ENV_WINDOW_POLICY,
};
use crate::domain::jobs::WindowPolicy;
use crate::domain::planner::CatalogMode;

#[derive(Parser)]
#[command(name = "mart")]
#[command(version, about = "Database query-log mining pipeline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Sink SQLite database path
    #[arg(long, global = true, env = ENV_SINK_PATH)]
    pub sink_path: Option<PathBuf>,

    /// Source kind (redshift or slow_log)
    #[arg(long, global = true, env = ENV_SOURCE_KIND, value_parser = parse_source_kind)]
    pub source_kind: Option<SourceKind>,

    /// Redshift connection URL
    #[arg(long, global = true, env = ENV_SOURCE_URL)]
    pub source_url: Option<String>,

    /// MySQL slow-query-log path
    #[arg(long, global = true, env = ENV_SOURCE_PATH)]
    pub source_path: Option<PathBuf>,

    /// Schema catalog JSON file
    #[arg(long, global = true, env = ENV_CATALOG_PATH)]
    pub catalog_path: Option<PathBuf>,

    /// Catalog mode (lenient or strict)
    #[arg(long, global = true, env = ENV_CATALOG_MODE, value_parser = parse_catalog_mode)]
    pub catalog_mode: Option<CatalogMode>,

    /// Join count above which a query is flagged TOO_MANY_JOINS
    #[arg(long, global = true, env = ENV_JOIN_THRESHOLD)]
    pub join_threshold: Option<usize>,

    /// Cursor behavior after a failed window (drop_on_failure or retry_window)
    #[arg(long, global = true, env = ENV_WINDOW_POLICY, value_parser = parse_window_policy)]
    pub window_policy: Option<WindowPolicy>,
}

/// Parse source kind from CLI/env string
fn parse_source_kind(s: &str) -> Result<SourceKind, String> {
    match s.to_lowercase().as_str() {
        "redshift" => Ok(SourceKind::Redshift),
        "slow_log" | "slow-log" | "slowlog" => Ok(SourceKind::SlowLog),
        _ => Err(format!(
            "Invalid source kind '{}'. Valid options: redshift, slow_log",
            s
        )),
    }
}

/// Parse catalog mode from CLI/env string
fn parse_catalog_mode(s: &str) -> Result<CatalogMode, String> {
    match s.to_lowercase().as_str() {
        "lenient" => Ok(CatalogMode::Lenient),
        "strict" => Ok(CatalogMode::Strict),
        _ => Err(format!(
            "Invalid catalog mode '{}'. Valid options: lenient, strict",
            s
        )),
    }
}

/// Parse window policy from CLI/env string
fn parse_window_policy(s: &str) -> Result<WindowPolicy, String> {
    match s.to_lowercase().replace('-', "_").as_str() {
        "drop_on_failure" | "drop" => Ok(WindowPolicy::DropOnFailure),
        "retry_window" | "retry" => Ok(WindowPolicy::RetryWindow),
        _ => Err(format!(
            "Invalid window policy '{}'. Valid options: drop_on_failure, retry_window",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Run the scheduled jobs (default command)
    Start,
    /// Classify one SQL statement and print its labels and optimized plan
    Classify {
        /// SQL text
        sql: String,
    },
    /// Take one connection-count sample now
    SampleConnections,
    /// Print queries flagged in the last N minutes as JSON
    BadQueries {
        /// Lookback in minutes
        #[arg(long, default_value_t = 60)]
        minutes: i64,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub config: Option<PathBuf>,
    pub sink_path: Option<PathBuf>,
    pub source_kind: Option<SourceKind>,
    pub source_url: Option<String>,
    pub source_path: Option<PathBuf>,
    pub catalog_path: Option<PathBuf>,
    pub catalog_mode: Option<CatalogMode>,
    pub join_threshold: Option<usize>,
    pub window_policy: Option<WindowPolicy>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        config: cli.config,
        sink_path: cli.sink_path,
        source_kind: cli.source_kind,
        source_url: cli.source_url,
        source_path: cli.source_path,
        catalog_path: cli.catalog_path,
        catalog_mode: cli.catalog_mode,
        join_threshold: cli.join_threshold,
        window_policy: cli.window_policy,
    };
    (config, cli.command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_source_kind() {
        assert_eq!(parse_source_kind("Redshift"), Ok(SourceKind::Redshift));
        assert_eq!(parse_source_kind("slow-log"), Ok(SourceKind::SlowLog));
        assert!(parse_source_kind("mysql").is_err());
    }

    #[test]
    fn test_parse_window_policy() {
        assert_eq!(parse_window_policy("retry-window"), Ok(WindowPolicy::RetryWindow));
        assert_eq!(parse_window_policy("DROP"), Ok(WindowPolicy::DropOnFailure));
        assert!(parse_window_policy("never").is_err());
    }

    #[test]
    fn test_cli_parses_classify() {
        let cli = Cli::try_parse_from([
            "mart",
            "--join-threshold",
            "6",
            "classify",
            "select 1",
        ])
        .unwrap();
        assert_eq!(cli.join_threshold, Some(6));
        assert!(matches!(cli.command, Some(Commands::Classify { sql }) if sql == "select 1"));
    }

    #[test]
    fn test_cli_global_args_after_subcommand() {
        let cli = Cli::try_parse_from(["mart", "bad-queries", "--minutes", "15", "--catalog-mode", "strict"])
            .unwrap();
        assert_eq!(cli.catalog_mode, Some(CatalogMode::Strict));
        assert!(matches!(cli.command, Some(Commands::BadQueries { minutes: 15 })));
    }
}
