//! Domain logic for query-log mining
//!
//! - `planner` - SQL plan construction and anti-pattern classification
//! - `jobs` - windowed extraction jobs and their counters

pub mod jobs;
pub mod planner;

pub use jobs::{
    BadQueriesJob, ConnectionsJob, Cron, CronHealthCheck, JobError, MetricsRegistry, StatsJob,
    WindowPolicy,
};
pub use planner::{AntiPattern, Classifier, SchemaCatalog};
