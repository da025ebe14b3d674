//! Cron health check

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::metrics::{Counter, MetricsRegistry};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy { message: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Reports unhealthy once `failed_iterations / iterations` exceeds the ratio
#[derive(Debug, Clone)]
pub struct CronHealthCheck {
    job: &'static str,
    iterations: Counter,
    failed_iterations: Counter,
    max_failure_ratio: f64,
}

impl CronHealthCheck {
    pub fn new(
        job: &'static str,
        iterations: Counter,
        failed_iterations: Counter,
        max_failure_ratio: f64,
    ) -> Self {
        Self {
            job,
            iterations,
            failed_iterations,
            max_failure_ratio,
        }
    }

    pub fn job(&self) -> &'static str {
        self.job
    }

    pub fn check(&self) -> HealthStatus {
        let iterations = self.iterations.get();
        if iterations == 0 {
            return HealthStatus::Healthy;
        }
        let failed = self.failed_iterations.get();
        let ratio = failed as f64 / iterations as f64;
        if ratio > self.max_failure_ratio {
            HealthStatus::Unhealthy {
                message: format!(
                    "{} failed {} of {} windows ({:.0}% > {:.0}%)",
                    self.job,
                    failed,
                    iterations,
                    ratio * 100.0,
                    self.max_failure_ratio * 100.0
                ),
            }
        } else {
            HealthStatus::Healthy
        }
    }
}

/// Log every check's status each `period` until shutdown
///
/// Unhealthy jobs are logged at warn level. The first report comes one
/// period after start.
pub fn start_health_report_task(
    checks: Vec<CronHealthCheck>,
    metrics: std::sync::Arc<MetricsRegistry>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        tracing::debug!("Health report task stopping");
                        break;
                    }
                }
                _ = interval.tick() => {
                    report(&checks, &metrics);
                }
            }
        }
    })
}

fn report(checks: &[CronHealthCheck], metrics: &MetricsRegistry) {
    for check in checks {
        match check.check() {
            HealthStatus::Healthy => tracing::debug!(job = check.job(), "Job healthy"),
            HealthStatus::Unhealthy { message } => {
                tracing::warn!(job = check.job(), %message, "Job unhealthy")
            }
        }
    }
    tracing::debug!(counters = ?metrics.snapshot(), "Job counters");
}
