//! Metrics for synchronizers and mutators.
//!
//! Recorded through the `metrics` facade; install any exporter to collect
//! them. Every series carries a `kind` label naming the resource collection.
//!
//! - `informer_lists_total{kind, outcome}`
//! - `informer_watch_sessions_total{kind}`
//! - `informer_watch_closed_total{kind, reason}`
//! - `informer_events_total{kind, change}`
//! - `informer_handler_failures_total{kind, handler}`
//! - `informer_relist_backoff_seconds{kind}`
//! - `informer_cache_entries{kind}`
//! - `mutator_conflicts_total`, `mutator_outcomes_total{outcome}`, `mutator_attempts`

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Metrics for one synchronizer.
#[derive(Debug, Clone)]
pub struct InformerMetrics {
    kind: Arc<str>,
}

impl InformerMetrics {
    /// Create a metrics handle for a resource kind.
    pub fn new(kind: &str) -> Self {
        Self { kind: kind.into() }
    }

    fn kind(&self) -> String {
        self.kind.to_string()
    }

    /// Record a list call.
    pub fn record_list(&self, ok: bool) {
        let outcome = if ok { "success" } else { "failure" };
        counter!("informer_lists_total", "kind" => self.kind(), "outcome" => outcome).increment(1);
    }

    /// Record a watch session being opened.
    pub fn record_watch_opened(&self) {
        counter!("informer_watch_sessions_total", "kind" => self.kind()).increment(1);
    }

    /// Record a watch session closing.
    pub fn record_watch_closed(&self, reason: &'static str) {
        counter!("informer_watch_closed_total", "kind" => self.kind(), "reason" => reason)
            .increment(1);
    }

    /// Record an applied change.
    pub fn record_event(&self, change: &'static str) {
        counter!("informer_events_total", "kind" => self.kind(), "change" => change).increment(1);
    }

    /// Record a failed or panicked handler.
    pub fn record_handler_failure(&self, handler: &str) {
        counter!(
            "informer_handler_failures_total",
            "kind" => self.kind(),
            "handler" => handler.to_string()
        )
        .increment(1);
    }

    /// Record a relist backoff delay.
    pub fn record_relist_backoff(&self, delay: Duration) {
        histogram!("informer_relist_backoff_seconds", "kind" => self.kind())
            .record(delay.as_secs_f64());
    }

    /// Update the cache size gauge.
    pub fn set_cache_entries(&self, entries: usize) {
        gauge!("informer_cache_entries", "kind" => self.kind()).set(entries as f64);
    }
}

/// Metrics for conflict-retrying mutations.
#[derive(Debug, Clone, Copy, Default)]
pub struct MutatorMetrics;

impl MutatorMetrics {
    /// Record a conflict that triggered a retry or exhausted the budget.
    pub fn record_conflict(&self) {
        counter!("mutator_conflicts_total").increment(1);
    }

    /// Record the end of a mutate call.
    pub fn record_outcome(&self, outcome: &'static str, attempts: u32) {
        counter!("mutator_outcomes_total", "outcome" => outcome).increment(1);
        histogram!("mutator_attempts").record(f64::from(attempts));
    }
}
