//! Query stats job

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::JobError;
use super::cron::CronJob;
use super::metrics::{Counter, MetricsRegistry};
use crate::core::constants::JOB_QUERY_STATS;
use crate::data::traits::SinkRepository;
use crate::data::types::UserQuery;
use crate::source::QuerySource;

/// Copies every sampled query into the sink together with its digest
pub struct StatsJob {
    source: Arc<dyn QuerySource>,
    sink: Arc<dyn SinkRepository>,
    stored: Counter,
}

impl StatsJob {
    pub fn new(
        source: Arc<dyn QuerySource>,
        sink: Arc<dyn SinkRepository>,
        metrics: &MetricsRegistry,
    ) -> Self {
        Self {
            source,
            sink,
            stored: metrics.job_counter(JOB_QUERY_STATS, "num_queries_stored"),
        }
    }
}

#[async_trait]
impl CronJob for StatsJob {
    type Record = UserQuery;

    fn name(&self) -> &'static str {
        JOB_QUERY_STATS
    }

    async fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UserQuery>, JobError> {
        Ok(self.source.get_queries(start, end).await?)
    }

    async fn process(&self, query: &UserQuery) -> Result<(), JobError> {
        let id = self.sink.store_user_query(query).await?;
        tracing::trace!(id, connection_id = %query.connection_id, "User query stored");
        self.stored.inc();
        Ok(())
    }
}
