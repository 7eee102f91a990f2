//! Exporter self-metrics

use std::time::Duration;

use chrono::{DateTime, Utc};
use prometheus::{Gauge, GaugeVec, IntCounterVec, IntGauge, Opts, Registry};

use crate::error::Result;

/// Outcome label of a scrape cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleResult {
    Success,
    DiscoveryError,
}

impl CycleResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleResult::Success => "success",
            CycleResult::DiscoveryError => "discovery_error",
        }
    }
}

/// Gauges and counters describing the scrape loop itself
#[derive(Debug, Clone)]
pub struct ScrapeMetrics {
    scrape_duration: Gauge,
    last_scrape: Gauge,
    projects: IntGauge,
    cycles: IntCounterVec,
}

impl ScrapeMetrics {
    /// Create the metrics and register them in `registry`.
    pub fn register(namespace: &str, registry: &Registry) -> Result<Self> {
        let opts = |name: &str, help: &str| {
            Opts::new(name, help)
                .namespace(namespace)
                .subsystem("quota_exporter")
        };

        let scrape_duration = Gauge::with_opts(opts(
            "scrape_duration_seconds",
            "Wall time of the last completed scrape cycle.",
        ))?;
        let last_scrape = Gauge::with_opts(opts(
            "last_scrape_timestamp_seconds",
            "Unix time of the last published snapshot.",
        ))?;
        let projects = IntGauge::with_opts(opts(
            "projects",
            "Projects in the last published snapshot.",
        ))?;
        let cycles = IntCounterVec::new(
            opts("scrape_cycles_total", "Scrape cycles by result."),
            &["result"],
        )?;
        let build_info = GaugeVec::new(
            opts("build_info", "Exporter build information."),
            &["version"],
        )?;

        registry.register(Box::new(scrape_duration.clone()))?;
        registry.register(Box::new(last_scrape.clone()))?;
        registry.register(Box::new(projects.clone()))?;
        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(build_info.clone()))?;

        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1.0);

        Ok(Self {
            scrape_duration,
            last_scrape,
            projects,
            cycles,
        })
    }

    /// Record a cycle that published a snapshot.
    pub fn record_success(&self, elapsed: Duration, completed_at: DateTime<Utc>, projects: usize) {
        self.scrape_duration.set(elapsed.as_secs_f64());
        self.last_scrape
            .set(completed_at.timestamp_millis() as f64 / 1000.0);
        self.projects.set(projects as i64);
        self.cycles
            .with_label_values(&[CycleResult::Success.as_str()])
            .inc();
    }

    /// Record a cycle skipped because discovery failed.
    pub fn record_discovery_error(&self) {
        self.cycles
            .with_label_values(&[CycleResult::DiscoveryError.as_str()])
            .inc();
    }

    pub fn cycles(&self, result: CycleResult) -> u64 {
        self.cycles.with_label_values(&[result.as_str()]).get()
    }

    pub fn projects(&self) -> i64 {
        self.projects.get()
    }

    pub fn scrape_duration(&self) -> f64 {
        self.scrape_duration.get()
    }

    pub fn last_scrape_timestamp(&self) -> f64 {
        self.last_scrape.get()
    }
}
