//! Metrics collection for observability
//!
//! Prometheus metrics for the recomputation pipeline. Each `Metrics` owns its
//! registry, so several pipelines can live in one process.
//!
//! # Metrics
//!
//! - `balances_notifications_total` - Store change notifications received
//! - `balances_recomputations_total` - Aggregations run
//! - `balances_recompute_failures_total` - Aggregations that fell back to stale data
//! - `balances_partial_snapshots_total` - Best-effort results with skipped lines
//! - `balances_published_version` - Version of the latest published snapshot
//! - `balances_recompute_duration_seconds` - Histogram of aggregation latency

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Store change notifications received
    pub notifications_total: IntCounter,

    /// Aggregations run
    pub recomputations_total: IntCounter,

    /// Aggregations that failed
    pub recompute_failures_total: IntCounter,

    /// Partial (best-effort) results published
    pub partial_snapshots_total: IntCounter,

    /// Latest published version
    pub published_version: IntGauge,

    /// Aggregation duration histogram
    pub recompute_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let notifications_total = IntCounter::new(
            "balances_notifications_total",
            "Store change notifications received",
        )?;
        registry.register(Box::new(notifications_total.clone()))?;

        let recomputations_total =
            IntCounter::new("balances_recomputations_total", "Aggregations run")?;
        registry.register(Box::new(recomputations_total.clone()))?;

        let recompute_failures_total = IntCounter::new(
            "balances_recompute_failures_total",
            "Aggregations that fell back to stale data",
        )?;
        registry.register(Box::new(recompute_failures_total.clone()))?;

        let partial_snapshots_total = IntCounter::new(
            "balances_partial_snapshots_total",
            "Best-effort results with skipped lines",
        )?;
        registry.register(Box::new(partial_snapshots_total.clone()))?;

        let published_version = IntGauge::new(
            "balances_published_version",
            "Version of the latest published snapshot",
        )?;
        registry.register(Box::new(published_version.clone()))?;

        let recompute_duration = Histogram::with_opts(
            HistogramOpts::new(
                "balances_recompute_duration_seconds",
                "Histogram of aggregation latency",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500]),
        )?;
        registry.register(Box::new(recompute_duration.clone()))?;

        Ok(Self {
            notifications_total,
            recomputations_total,
            recompute_failures_total,
            partial_snapshots_total,
            published_version,
            recompute_duration,
            registry,
        })
    }

    /// Record a store change notification
    pub fn record_notification(&self) {
        self.notifications_total.inc();
    }

    /// Record a finished aggregation
    pub fn record_recompute(&self, duration_seconds: f64) {
        self.recomputations_total.inc();
        self.recompute_duration.observe(duration_seconds);
    }

    /// Record a failed aggregation
    pub fn record_failure(&self) {
        self.recompute_failures_total.inc();
    }

    /// Record a partial result
    pub fn record_partial(&self) {
        self.partial_snapshots_total.inc();
    }

    /// Record a publication
    pub fn record_published(&self, version: u64) {
        self.published_version.set(version as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("recomputations_total", &self.recomputations_total.get())
            .field("published_version", &self.published_version.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert_eq!(metrics.recomputations_total.get(), 0);
        assert_eq!(metrics.published_version.get(), 0);
    }

    #[test]
    fn test_independent_registries() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.record_notification();
        assert_eq!(a.notifications_total.get(), 1);
        assert_eq!(b.notifications_total.get(), 0);
    }

    #[test]
    fn test_record_recompute() {
        let metrics = Metrics::new().unwrap();
        metrics.record_recompute(0.002);
        metrics.record_recompute(0.004);
        assert_eq!(metrics.recomputations_total.get(), 2);
        assert_eq!(metrics.recompute_duration.get_sample_count(), 2);
    }

    #[test]
    fn test_record_published() {
        let metrics = Metrics::new().unwrap();
        metrics.record_published(7);
        assert_eq!(metrics.published_version.get(), 7);
        assert_eq!(metrics.registry().gather().len(), 6);
    }
}
