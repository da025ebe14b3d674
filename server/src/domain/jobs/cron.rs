//! Windowed cron
//!
//! A `Cron` owns the extraction cursor of one job. Each `run()` covers the
//! half-open window `[start_range, now)`: records are fetched once, processed
//! one by one in source order, and a record that fails is counted and skipped.
//! Errors that would fail every remaining record (source down, sink pool gone)
//! end the window early and count as a failed iteration.
//!
//! What happens to the cursor after a failed window is the `WindowPolicy`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::JobError;
use super::health::CronHealthCheck;
use super::metrics::{Counter, MetricsRegistry};

/// Source of the window end
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Cursor behavior after a window fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPolicy {
    /// Always advance. A failed window's records are never scanned.
    #[default]
    DropOnFailure,
    /// Keep the cursor so the next run covers the failed window again
    RetryWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CronState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowOutcome {
    Succeeded,
    Failed,
}

/// One unit of windowed work
#[async_trait]
pub trait CronJob: Send + Sync + 'static {
    type Record: Send + Sync;

    fn name(&self) -> &'static str;

    /// Records observed in `[start, end)`
    async fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Self::Record>, JobError>;

    async fn process(&self, record: &Self::Record) -> Result<(), JobError>;
}

/// Outcome of a single `run()`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub fetched: usize,
    pub processed: usize,
    pub failed_records: usize,
    /// Set when the window was aborted
    pub window_error: Option<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.window_error.is_none()
    }
}

pub struct Cron<J: CronJob> {
    job: J,
    clock: Arc<dyn Clock>,
    policy: WindowPolicy,
    start_range: Mutex<DateTime<Utc>>,
    iterations: Counter,
    failed_iterations: Counter,
    failed_records: Counter,
    state: parking_lot::Mutex<CronState>,
    last_outcome: parking_lot::Mutex<Option<WindowOutcome>>,
}

impl<J: CronJob> Cron<J> {
    /// Build a cron whose first window starts at `clock.now()`
    pub fn new(
        job: J,
        clock: Arc<dyn Clock>,
        policy: WindowPolicy,
        metrics: &MetricsRegistry,
    ) -> Self {
        let name = job.name();
        let start = clock.now();
        Self {
            iterations: metrics.job_counter(name, "iterations"),
            failed_iterations: metrics.job_counter(name, "failed_iterations"),
            failed_records: metrics.job_counter(name, "failed_records"),
            job,
            clock,
            policy,
            start_range: Mutex::new(start),
            state: parking_lot::Mutex::new(CronState::Idle),
            last_outcome: parking_lot::Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.job.name()
    }

    pub fn job(&self) -> &J {
        &self.job
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }

    /// Inclusive lower bound of the next window
    pub async fn start_range(&self) -> DateTime<Utc> {
        *self.start_range.lock().await
    }

    pub fn iterations(&self) -> u64 {
        self.iterations.get()
    }

    pub fn failed_iterations(&self) -> u64 {
        self.failed_iterations.get()
    }

    pub fn state(&self) -> CronState {
        *self.state.lock()
    }

    /// Outcome of the latest finished window, `None` before the first run
    pub fn last_outcome(&self) -> Option<WindowOutcome> {
        *self.last_outcome.lock()
    }

    pub fn health_check(&self, max_failure_ratio: f64) -> CronHealthCheck {
        CronHealthCheck::new(
            self.name(),
            self.iterations.clone(),
            self.failed_iterations.clone(),
            max_failure_ratio,
        )
    }

    /// Process one window
    ///
    /// Never returns an error: failures are logged, counted and reflected in
    /// the report. Overlapping calls queue on the cursor.
    pub async fn run(&self) -> RunReport {
        let mut cursor = self.start_range.lock().await;
        let start = *cursor;
        // A clock that stepped back must not rewind the cursor
        let end = self.clock.now().max(start);

        *self.state.lock() = CronState::Running;
        tracing::debug!(job = self.name(), %start, %end, "Window started");

        let mut report = RunReport {
            start,
            end,
            fetched: 0,
            processed: 0,
            failed_records: 0,
            window_error: None,
        };

        match self.job.fetch(start, end).await {
            Ok(records) => {
                report.fetched = records.len();
                for record in &records {
                    match self.job.process(record).await {
                        Ok(()) => report.processed += 1,
                        Err(e) if e.aborts_window() => {
                            report.window_error = Some(e.to_string());
                            break;
                        }
                        Err(e) => {
                            report.failed_records += 1;
                            self.failed_records.inc();
                            tracing::warn!(job = self.name(), error = %e, "Record failed");
                        }
                    }
                }
            }
            Err(e) => report.window_error = Some(e.to_string()),
        }

        self.iterations.inc();
        let outcome = match &report.window_error {
            None => WindowOutcome::Succeeded,
            Some(error) => {
                self.failed_iterations.inc();
                tracing::warn!(
                    job = self.name(),
                    %start,
                    %end,
                    policy = ?self.policy,
                    error = %error,
                    "Window failed"
                );
                WindowOutcome::Failed
            }
        };

        if outcome == WindowOutcome::Succeeded || self.policy == WindowPolicy::DropOnFailure {
            *cursor = end;
        }

        *self.last_outcome.lock() = Some(outcome);
        tracing::debug!(
            job = self.name(),
            fetched = report.fetched,
            processed = report.processed,
            failed_records = report.failed_records,
            "Window finished"
        );
        *self.state.lock() = CronState::Idle;

        report
    }

    /// Run every `period` after `delay` until shutdown is signalled
    ///
    /// Shutdown is observed between windows only.
    pub fn start(
        self: &Arc<Self>,
        delay: Duration,
        period: Duration,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let cron = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + delay, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::debug!(
                job = cron.name(),
                delay_secs = delay.as_secs(),
                period_secs = period.as_secs(),
                "Cron scheduled"
            );

            loop {
                tokio::select! {
                    biased;

                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            tracing::debug!(job = cron.name(), "Cron stopping");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        cron.run().await;
                    }
                }
            }
        })
    }
}
