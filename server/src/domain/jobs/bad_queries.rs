//! Bad queries job
//!
//! Plans every sampled query against the schema catalog and stores the ones
//! that carry a watched anti-pattern label. Statements the planner rejects are
//! counted and skipped.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::JobError;
use super::cron::CronJob;
use super::metrics::{Counter, MetricsRegistry};
use crate::core::constants::JOB_BAD_QUERIES;
use crate::data::traits::SinkRepository;
use crate::data::types::UserQuery;
use crate::domain::planner::{AntiPattern, Classifier, PlanError};
use crate::source::QuerySource;

pub struct BadQueriesJob {
    source: Arc<dyn QuerySource>,
    sink: Arc<dyn SinkRepository>,
    classifier: Classifier,
    watched: BTreeSet<AntiPattern>,
    processed: Counter,
    flagged: Counter,
    parse_errors: Counter,
    unsupported: Counter,
}

impl BadQueriesJob {
    /// `watched` falls back to `{TooManyJoins}` when empty
    pub fn new(
        source: Arc<dyn QuerySource>,
        sink: Arc<dyn SinkRepository>,
        classifier: Classifier,
        watched: BTreeSet<AntiPattern>,
        metrics: &MetricsRegistry,
    ) -> Self {
        let watched = if watched.is_empty() {
            BTreeSet::from([AntiPattern::TooManyJoins])
        } else {
            watched
        };
        Self {
            source,
            sink,
            classifier,
            watched,
            processed: metrics.job_counter(JOB_BAD_QUERIES, "num_queries_processed"),
            flagged: metrics.job_counter(JOB_BAD_QUERIES, "num_bad_queries"),
            parse_errors: metrics.job_counter(JOB_BAD_QUERIES, "num_parse_exception"),
            unsupported: metrics.job_counter(JOB_BAD_QUERIES, "num_unsupported"),
        }
    }

    pub fn watched(&self) -> &BTreeSet<AntiPattern> {
        &self.watched
    }
}

#[async_trait]
impl CronJob for BadQueriesJob {
    type Record = UserQuery;

    fn name(&self) -> &'static str {
        JOB_BAD_QUERIES
    }

    async fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UserQuery>, JobError> {
        Ok(self.source.get_queries(start, end).await?)
    }

    async fn process(&self, query: &UserQuery) -> Result<(), JobError> {
        self.processed.inc();

        let labels = match self.classifier.classify(&query.query) {
            Ok(labels) => labels,
            Err(e) => {
                match e {
                    PlanError::Parse(_) => self.parse_errors.inc(),
                    PlanError::Validation(_) | PlanError::Conversion(_) => self.unsupported.inc(),
                }
                return Err(e.into());
            }
        };

        if labels.is_disjoint(&self.watched) {
            return Ok(());
        }

        let names = labels.iter().map(|l| l.as_str().to_string()).collect();
        let id = self.sink.record_bad_query(query, names).await?;
        self.flagged.inc();
        tracing::debug!(
            id,
            connection_id = %query.connection_id,
            labels = ?labels,
            "Bad query recorded"
        );
        Ok(())
    }
}
