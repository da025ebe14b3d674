//! Connection count sampling
//!
//! Each window yields one sample stamped with the window end. `sample_now`
//! takes an extra sample outside the schedule.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::JobError;
use super::cron::CronJob;
use super::metrics::{Counter, MetricsRegistry};
use crate::core::constants::JOB_CONNECTIONS;
use crate::data::traits::SinkRepository;
use crate::data::types::ConnectionSample;
use crate::source::ConnectionSource;

pub struct ConnectionsJob {
    source: Arc<dyn ConnectionSource>,
    sink: Arc<dyn SinkRepository>,
    samples: Counter,
}

impl ConnectionsJob {
    pub fn new(
        source: Arc<dyn ConnectionSource>,
        sink: Arc<dyn SinkRepository>,
        metrics: &MetricsRegistry,
    ) -> Self {
        Self {
            source,
            sink,
            samples: metrics.job_counter(JOB_CONNECTIONS, "num_samples"),
        }
    }

    async fn observe(&self, at: DateTime<Utc>) -> Result<ConnectionSample, JobError> {
        let count = self.source.get_connections().await?;
        Ok(ConnectionSample {
            id: None,
            log_time: at.fixed_offset(),
            count,
        })
    }

    /// Sample and persist immediately, bypassing the cursor
    pub async fn sample_now(&self, at: DateTime<Utc>) -> Result<ConnectionSample, JobError> {
        let mut sample = self.observe(at).await?;
        sample.id = Some(self.sink.insert_connection_sample(&sample).await?);
        self.samples.inc();
        Ok(sample)
    }
}

#[async_trait]
impl CronJob for ConnectionsJob {
    type Record = ConnectionSample;

    fn name(&self) -> &'static str {
        JOB_CONNECTIONS
    }

    async fn fetch(
        &self,
        _start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ConnectionSample>, JobError> {
        Ok(vec![self.observe(end).await?])
    }

    async fn process(&self, sample: &ConnectionSample) -> Result<(), JobError> {
        self.sink.insert_connection_sample(sample).await?;
        self.samples.inc();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::Duration;

    use super::*;
    use crate::data::sqlite::repositories::select_connection_samples;
    use crate::domain::jobs::cron::{Cron, WindowPolicy};
    use crate::domain::jobs::test_support::{FakeConnectionSource, ManualClock, memory_sink, t0};

    #[tokio::test]
    async fn test_each_window_appends_one_sample() {
        let sink = memory_sink().await;
        let source = FakeConnectionSource::with(12);
        let metrics = MetricsRegistry::new();
        let clock = ManualClock::at(t0());
        let cron = Cron::new(
            ConnectionsJob::new(source.clone(), Arc::new(sink.clone()), &metrics),
            clock.clone(),
            WindowPolicy::default(),
            &metrics,
        );

        clock.advance(Duration::minutes(5));
        cron.run().await;
        *source.count.lock() = 15;
        clock.advance(Duration::minutes(5));
        cron.run().await;

        let samples = select_connection_samples(sink.pool(), &t0(), &(t0() + Duration::hours(1)))
            .await
            .unwrap();
        let counts: Vec<i64> = samples.iter().map(|s| s.count).collect();
        assert_eq!(counts, vec![12, 15]);
        assert_eq!(samples[0].log_time, t0() + Duration::minutes(5));
        assert_eq!(
            metrics.snapshot().get("mart.connections.num_samples"),
            Some(&2)
        );
    }

    #[tokio::test]
    async fn test_sample_now_leaves_cursor_alone() {
        let sink = memory_sink().await;
        let metrics = MetricsRegistry::new();
        let clock = ManualClock::at(t0());
        let cron = Cron::new(
            ConnectionsJob::new(FakeConnectionSource::with(3), Arc::new(sink.clone()), &metrics),
            clock.clone(),
            WindowPolicy::default(),
            &metrics,
        );

        let sample = cron.job().sample_now(t0() + Duration::seconds(30)).await.unwrap();
        assert!(sample.id.is_some());
        assert_eq!(sample.count, 3);
        assert_eq!(cron.start_range().await, t0());
        assert_eq!(cron.iterations(), 0);
    }

    #[tokio::test]
    async fn test_source_failure_fails_window() {
        let sink = memory_sink().await;
        let source = FakeConnectionSource::with(1);
        source.failing.store(true, Ordering::SeqCst);
        let metrics = MetricsRegistry::new();
        let clock = ManualClock::at(t0());
        let cron = Cron::new(
            ConnectionsJob::new(source, Arc::new(sink.clone()), &metrics),
            clock.clone(),
            WindowPolicy::default(),
            &metrics,
        );

        clock.advance(Duration::minutes(5));
        let report = cron.run().await;
        assert!(!report.succeeded());
        assert_eq!(cron.failed_iterations(), 1);
        assert!(cron.job().sample_now(t0()).await.is_err());
    }
}
