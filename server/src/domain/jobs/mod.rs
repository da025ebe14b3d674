//! Scheduled extraction jobs
//!
//! - `cron` - windowed scheduler with cursor, counters and window policy
//! - `metrics` - named atomic counters
//! - `health` - failure-ratio health check over a cron's counters
//! - `stats` - copies sampled queries into the sink with their digest
//! - `bad_queries` - classifies sampled queries and stores flagged ones
//! - `connections` - connection-count time series
//! - `locks` - lock waits and long transactions from lock snapshots

pub mod bad_queries;
pub mod connections;
pub mod cron;
pub mod health;
pub mod locks;
pub mod metrics;
pub mod stats;

pub use bad_queries::BadQueriesJob;
pub use connections::ConnectionsJob;
pub use cron::{
    Clock, Cron, CronJob, CronState, RunReport, SystemClock, WindowOutcome, WindowPolicy,
};
pub use health::{CronHealthCheck, HealthStatus, start_health_report_task};
pub use locks::LocksJob;
pub use metrics::{Counter, MetricsRegistry};
pub use stats::StatsJob;

use thiserror::Error;

use crate::data::SinkError;
use crate::domain::planner::PlanError;
use crate::source::SourceError;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),
}

impl JobError {
    /// Whether the error ends the current window instead of one record
    ///
    /// Any sink failure ends the window except a missing parent row, which
    /// only fails its own insert. Plan errors never do.
    pub fn aborts_window(&self) -> bool {
        match self {
            Self::Source(_) => true,
            Self::Sink(SinkError::ReferentialIntegrity { .. }) => false,
            Self::Sink(_) => true,
            Self::Plan(_) => false,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aborts_window() {
        assert!(JobError::from(SourceError::Config("x".into())).aborts_window());
        assert!(JobError::from(SinkError::Database(sqlx::Error::PoolTimedOut)).aborts_window());
        assert!(JobError::from(SinkError::Constraint("x".into())).aborts_window());
        assert!(
            !JobError::from(SinkError::ReferentialIntegrity {
                entity: "bad_query",
                reference: "x".into(),
            })
            .aborts_window()
        );
        assert!(!JobError::from(PlanError::Parse("x".into())).aborts_window());
    }
}
