//! Lock waits and long transactions
//!
//! Each window takes one snapshot of the source's locks, stamped with the
//! window end. An ungranted lock waits on every other transaction holding a
//! granted lock on the same relation. A transaction open longer than the
//! threshold is long running.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::JobError;
use super::cron::CronJob;
use super::metrics::{Counter, MetricsRegistry};
use crate::core::constants::JOB_LOCKS;
use crate::data::traits::SinkRepository;
use crate::data::types::{InnodbLockWait, LockEvent, LongTxn};
use crate::source::{LockSource, TxnLock};

pub struct LocksJob {
    source: Arc<dyn LockSource>,
    sink: Arc<dyn SinkRepository>,
    long_txn_after: Duration,
    lock_waits: Counter,
    long_txns: Counter,
}

impl LocksJob {
    pub fn new(
        source: Arc<dyn LockSource>,
        sink: Arc<dyn SinkRepository>,
        long_txn_after: Duration,
        metrics: &MetricsRegistry,
    ) -> Self {
        Self {
            source,
            sink,
            long_txn_after,
            lock_waits: metrics.job_counter(JOB_LOCKS, "num_lock_waits"),
            long_txns: metrics.job_counter(JOB_LOCKS, "num_long_txns"),
        }
    }
}

/// Derive the events of one lock snapshot taken at `at`
pub fn lock_events(
    locks: &[TxnLock],
    at: DateTime<Utc>,
    long_txn_after: Duration,
) -> Vec<LockEvent> {
    let log_time = at.fixed_offset();
    let mut events = Vec::new();

    let mut pairs = BTreeSet::new();
    for waiting in locks.iter().filter(|l| !l.granted) {
        let blockers = locks.iter().filter(|l| {
            l.granted
                && l.transaction.id != waiting.transaction.id
                && l.transaction.lock_table == waiting.transaction.lock_table
        });
        for blocking in blockers {
            if !pairs.insert((&waiting.transaction.id, &blocking.transaction.id)) {
                continue;
            }
            events.push(LockEvent::Wait {
                wait: InnodbLockWait {
                    id: None,
                    log_time,
                    waiting_id: waiting.transaction.id.clone(),
                    blocking_id: blocking.transaction.id.clone(),
                },
                waiting: waiting.transaction.clone(),
                blocking: blocking.transaction.clone(),
            });
        }
    }

    let cutoff = at - long_txn_after;
    let mut long_running = BTreeSet::new();
    for lock in locks {
        let txn = &lock.transaction;
        let Some(start) = txn.start_time else {
            continue;
        };
        if start <= cutoff && long_running.insert(&txn.id) {
            events.push(LockEvent::LongRunning {
                long_txn: LongTxn {
                    id: None,
                    log_time,
                    transaction_id: txn.id.clone(),
                },
                transaction: txn.clone(),
            });
        }
    }

    events
}

#[async_trait]
impl CronJob for LocksJob {
    type Record = LockEvent;

    fn name(&self) -> &'static str {
        JOB_LOCKS
    }

    async fn fetch(
        &self,
        _start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LockEvent>, JobError> {
        let mut locks = self.source.get_locks().await?;
        locks.retain(|lock| {
            let consistent = lock.transaction.has_consistent_times();
            if !consistent {
                tracing::warn!(
                    transaction = %lock.transaction.id,
                    "Skipping lock: wait started before the transaction"
                );
            }
            consistent
        });
        Ok(lock_events(&locks, end, self.long_txn_after))
    }

    async fn process(&self, event: &LockEvent) -> Result<(), JobError> {
        let id = self.sink.record_lock_event(event).await?;
        match event {
            LockEvent::Wait { wait, .. } => {
                tracing::debug!(
                    id,
                    waiting = %wait.waiting_id,
                    blocking = %wait.blocking_id,
                    "Lock wait stored"
                );
                self.lock_waits.inc();
            }
            LockEvent::LongRunning { long_txn, .. } => {
                tracing::debug!(
                    id,
                    transaction = %long_txn.transaction_id,
                    "Long transaction stored"
                );
                self.long_txns.inc();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::data::sqlite::repositories::{
        select_lock_waits, select_long_txns, transaction_exists,
    };
    use crate::domain::jobs::cron::{Cron, WindowPolicy};
    use crate::domain::jobs::test_support::{
        FailingSink, FakeLockSource, ManualClock, memory_sink, t0, txn_lock,
    };

    fn cron_over(
        source: Arc<FakeLockSource>,
        sink: Arc<dyn SinkRepository>,
        metrics: &MetricsRegistry,
    ) -> (Cron<LocksJob>, Arc<ManualClock>) {
        let clock = ManualClock::at(t0());
        let cron = Cron::new(
            LocksJob::new(source, sink, Duration::minutes(5), metrics),
            clock.clone(),
            WindowPolicy::default(),
            metrics,
        );
        (cron, clock)
    }

    #[test]
    fn test_ungranted_lock_waits_on_holders_of_same_relation() {
        let locks = vec![
            txn_lock("holder", "invoice", true, 2),
            txn_lock("waiter", "invoice", false, 1),
            txn_lock("other", "payment", true, 1),
        ];

        let events = lock_events(&locks, t0(), Duration::minutes(5));

        assert_eq!(events.len(), 1);
        let LockEvent::Wait { wait, .. } = &events[0] else {
            panic!("expected a lock wait");
        };
        assert_eq!(wait.waiting_id, "waiter");
        assert_eq!(wait.blocking_id, "holder");
        assert_eq!(wait.log_time, t0());
    }

    #[test]
    fn test_old_transactions_are_long_running_once() {
        let locks = vec![
            txn_lock("old", "invoice", true, 10),
            txn_lock("old", "payment", true, 10),
            txn_lock("edge", "store", true, 5),
            txn_lock("young", "item", true, 4),
        ];

        let events = lock_events(&locks, t0(), Duration::minutes(5));

        let ids: Vec<&str> = events
            .iter()
            .map(|e| match e {
                LockEvent::LongRunning { long_txn, .. } => long_txn.transaction_id.as_str(),
                LockEvent::Wait { .. } => panic!("unexpected lock wait"),
            })
            .collect();
        assert_eq!(ids, vec!["old", "edge"]);
    }

    #[test]
    fn test_waiter_holding_many_locks_is_paired_once() {
        let locks = vec![
            txn_lock("holder", "invoice", true, 1),
            txn_lock("holder", "invoice", true, 1),
            txn_lock("waiter", "invoice", false, 1),
            txn_lock("waiter", "invoice", false, 1),
        ];

        assert_eq!(lock_events(&locks, t0(), Duration::minutes(5)).len(), 1);
    }

    #[tokio::test]
    async fn test_window_stores_waits_and_long_txns() {
        let sink = memory_sink().await;
        let source = FakeLockSource::with(vec![
            txn_lock("holder", "invoice", true, 10),
            txn_lock("waiter", "invoice", false, 0),
        ]);
        let metrics = MetricsRegistry::new();
        let (cron, clock) = cron_over(source, Arc::new(sink.clone()), &metrics);

        clock.advance(Duration::minutes(1));
        let report = cron.run().await;
        assert!(report.succeeded());
        assert_eq!(report.processed, 2);

        let end = t0() + Duration::hours(1);
        let waits = select_lock_waits(sink.pool(), &t0(), &end).await.unwrap();
        assert_eq!(waits.len(), 1);
        assert_eq!(waits[0].log_time, report.end);
        let long = select_long_txns(sink.pool(), &t0(), &end).await.unwrap();
        assert_eq!(long.len(), 1);
        assert_eq!(long[0].transaction_id, "holder");
        assert!(transaction_exists(sink.pool(), "waiter").await.unwrap());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.get("mart.locks.num_lock_waits"), Some(&1));
        assert_eq!(snapshot.get("mart.locks.num_long_txns"), Some(&1));
    }

    #[tokio::test]
    async fn test_inconsistent_transaction_is_skipped() {
        let sink = memory_sink().await;
        let mut bad = txn_lock("bad", "invoice", true, 10);
        bad.transaction.wait_start_time = bad
            .transaction
            .start_time
            .map(|t| t - Duration::seconds(1));
        let source = FakeLockSource::with(vec![bad, txn_lock("good", "item", true, 10)]);
        let metrics = MetricsRegistry::new();
        let (cron, clock) = cron_over(source, Arc::new(sink.clone()), &metrics);

        clock.advance(Duration::minutes(5));
        let report = cron.run().await;
        assert!(report.succeeded());
        assert_eq!(report.fetched, 1);
        assert!(!transaction_exists(sink.pool(), "bad").await.unwrap());
        assert!(transaction_exists(sink.pool(), "good").await.unwrap());
    }

    #[tokio::test]
    async fn test_source_failure_fails_window() {
        let sink = memory_sink().await;
        let source = FakeLockSource::with(vec![txn_lock("old", "invoice", true, 10)]);
        source.failing.store(true, Ordering::SeqCst);
        let metrics = MetricsRegistry::new();
        let (cron, clock) = cron_over(source, Arc::new(sink.clone()), &metrics);

        clock.advance(Duration::minutes(5));
        let report = cron.run().await;
        assert!(!report.succeeded());
        assert_eq!(cron.failed_iterations(), 1);
    }

    #[tokio::test]
    async fn test_dead_sink_aborts_window() {
        let source = FakeLockSource::with(vec![
            txn_lock("a", "invoice", true, 10),
            txn_lock("b", "item", true, 10),
        ]);
        let metrics = MetricsRegistry::new();
        let (cron, clock) = cron_over(source, Arc::new(FailingSink), &metrics);

        clock.advance(Duration::minutes(5));
        let report = cron.run().await;
        assert!(!report.succeeded());
        assert_eq!(report.fetched, 2);
        assert_eq!(report.processed, 0);
        assert_eq!(report.failed_records, 0);
    }
}
