//! # Run Metrics
//!
//! Prometheus counters for one scan, kept in a dedicated
//! [`prometheus::Registry`]. `--metrics` prints the text exposition after
//! the run.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};

use holdscan_engine::ScanReport;

/// Metric handles for a scan run.
#[derive(Clone)]
pub struct ScanMetrics {
    registry: Registry,
    /// Pages merged across all strategies.
    pub pages_fetched_total: IntCounter,
    /// Page requests that failed, retried ones included.
    pub page_failures_total: IntCounter,
    pub shards_succeeded_total: IntCounter,
    pub shards_failed_total: IntCounter,
    /// Strategies that failed before one succeeded.
    pub strategy_failures_total: IntCounter,
    /// Distinct accounts in the final result.
    pub holders_found: IntGauge,
    pub run_duration_seconds: Histogram,
}

impl ScanMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("holdscan".into()), None)?;

        let pages_fetched_total =
            IntCounter::new("pages_fetched_total", "Pages merged into the holder set")?;
        registry.register(Box::new(pages_fetched_total.clone()))?;

        let page_failures_total =
            IntCounter::new("page_failures_total", "Page requests that returned an error")?;
        registry.register(Box::new(page_failures_total.clone()))?;

        let shards_succeeded_total =
            IntCounter::new("shards_succeeded_total", "Shards fetched successfully")?;
        registry.register(Box::new(shards_succeeded_total.clone()))?;

        let shards_failed_total = IntCounter::new("shards_failed_total", "Shards that failed")?;
        registry.register(Box::new(shards_failed_total.clone()))?;

        let strategy_failures_total = IntCounter::new(
            "strategy_failures_total",
            "Strategies that failed and triggered a fallback",
        )?;
        registry.register(Box::new(strategy_failures_total.clone()))?;

        let holders_found = IntGauge::new("holders_found", "Distinct holder accounts found")?;
        registry.register(Box::new(holders_found.clone()))?;

        let run_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("run_duration_seconds", "Wall-clock duration of a scan")
                .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 300.0, 900.0, 3600.0]),
        )?;
        registry.register(Box::new(run_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            pages_fetched_total,
            page_failures_total,
            shards_succeeded_total,
            shards_failed_total,
            strategy_failures_total,
            holders_found,
            run_duration_seconds,
        })
    }

    /// Folds a finished run into the counters.
    pub fn record(&self, report: &ScanReport) {
        let meta = &report.metadata;
        self.pages_fetched_total.inc_by(u64::from(meta.pages_fetched));
        self.page_failures_total.inc_by(u64::from(meta.failed_page_calls));
        self.shards_succeeded_total.inc_by(meta.successful_shards as u64);
        self.shards_failed_total.inc_by(meta.failed_shards as u64);
        self.strategy_failures_total.inc_by(meta.failures.len() as u64);
        self.holders_found.set(report.holders.len() as i64);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_namespace() {
        let metrics = ScanMetrics::new().unwrap();
        metrics.pages_fetched_total.inc_by(3);
        metrics.holders_found.set(42);
        let text = metrics.encode().unwrap();
        assert!(text.contains("holdscan_pages_fetched_total 3"));
        assert!(text.contains("holdscan_holders_found 42"));
    }
}
