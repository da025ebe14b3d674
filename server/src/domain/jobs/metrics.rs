//! Job counters
//!
//! Named monotonic counters, shared by handle. Names follow
//! `<prefix>.<job>.<counter>`, e.g. `mart.bad_queries.num_bad_queries`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::core::constants::METRIC_PREFIX;

/// Handle to one registered counter
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicU64>);

impl Counter {
    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or register the counter `name`
    pub fn counter(&self, name: &str) -> Counter {
        self.counters.entry(name.to_string()).or_default().clone()
    }

    /// Counter scoped to a job
    pub fn job_counter(&self, job: &str, counter: &str) -> Counter {
        self.counter(&metric_name(job, counter))
    }

    /// Current value of every counter, sorted by name
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().get()))
            .collect()
    }
}

pub fn metric_name(job: &str, counter: &str) -> String {
    format!("{}.{}.{}", METRIC_PREFIX, job, counter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_handles_share_state() {
        let registry = MetricsRegistry::new();
        let a = registry.job_counter("bad_queries", "num_bad_queries");
        let b = registry.counter("mart.bad_queries.num_bad_queries");

        a.inc();
        b.inc_by(2);
        assert_eq!(a.get(), 3);
        assert_eq!(
            registry.snapshot().get("mart.bad_queries.num_bad_queries"),
            Some(&3)
        );
    }

    #[test]
    fn test_snapshot_sorted() {
        let registry = MetricsRegistry::new();
        registry.counter("mart.b.x").inc();
        registry.counter("mart.a.x");
        let names: Vec<String> = registry.snapshot().into_keys().collect();
        assert_eq!(names, vec!["mart.a.x".to_string(), "mart.b.x".to_string()]);
    }

    #[test]
    fn test_metric_name() {
        assert_eq!(
            metric_name("query_stats", "iterations"),
            "mart.query_stats.iterations"
        );
    }
}
