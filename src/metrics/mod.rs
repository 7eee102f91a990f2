//! Metrics module
//!
//! Builds the exporter registry: the quota collector reading the snapshot
//! store plus the exporter's own scrape metrics.

mod exporter;
mod proptest;
mod scrape_metrics;

use std::sync::Arc;

use prometheus::{Encoder, Registry, TextEncoder};

use crate::error::Result;
use crate::snapshot::SnapshotStore;

#[allow(unused_imports)]
pub use exporter::{render_samples, QuotaCollector, QuotaFamily, QuotaSample};
pub use scrape_metrics::{CycleResult, ScrapeMetrics};

/// Create a registry exposing `store` under `namespace`.
pub fn build_registry(
    namespace: &str,
    store: Arc<SnapshotStore>,
) -> Result<(Registry, ScrapeMetrics)> {
    let registry = Registry::new();
    registry.register(Box::new(QuotaCollector::new(namespace, store)?))?;
    let scrape_metrics = ScrapeMetrics::register(namespace, &registry)?;
    Ok((registry, scrape_metrics))
}

/// Encode everything in `registry` in the Prometheus text format.
pub fn encode_text(registry: &Registry) -> Result<(String, Vec<u8>)> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}
