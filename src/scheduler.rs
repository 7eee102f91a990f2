//! Scrape Scheduler
//!
//! Drives periodic scrape cycles: resolve the project set, fetch every
//! project with bounded concurrency, then publish one complete snapshot.
//! The scheduler is the only writer of the snapshot store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::config::ExporterConfig;
use crate::discovery::ProjectDiscovery;
use crate::domain::ports::{ProjectDirectory, QuotaSource, Snapshot};
use crate::error::Result;
use crate::fetcher::QuotaFetcher;
use crate::metrics::ScrapeMetrics;
use crate::snapshot::SnapshotStore;

/// Periodic scrape loop
pub struct ScrapeScheduler {
    discovery: ProjectDiscovery,
    fetcher: QuotaFetcher,
    store: Arc<SnapshotStore>,
    metrics: Option<ScrapeMetrics>,
    scrape_interval: Duration,
    fetch_concurrency: usize,
    cycle: AtomicU64,
}

impl ScrapeScheduler {
    pub fn new(
        discovery: ProjectDiscovery,
        fetcher: QuotaFetcher,
        store: Arc<SnapshotStore>,
        scrape_interval: Duration,
        fetch_concurrency: usize,
    ) -> Self {
        Self {
            discovery,
            fetcher,
            store,
            metrics: None,
            scrape_interval,
            fetch_concurrency: fetch_concurrency.max(1),
            cycle: AtomicU64::new(0),
        }
    }

    /// Wire discovery and fetching from one configuration.
    pub fn from_config(
        config: &ExporterConfig,
        directory: Arc<dyn ProjectDirectory>,
        source: Arc<dyn QuotaSource>,
        store: Arc<SnapshotStore>,
    ) -> Self {
        Self::new(
            ProjectDiscovery::from_config(config, directory),
            QuotaFetcher::new(source),
            store,
            config.scrape_interval,
            config.fetch_concurrency,
        )
    }

    /// Report cycle outcomes to `metrics`.
    pub fn with_metrics(mut self, metrics: ScrapeMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Run one scrape cycle and publish its snapshot.
    ///
    /// On a discovery error nothing is published and the previous snapshot
    /// stays visible.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<Arc<Snapshot>> {
        let started = Instant::now();

        let projects = match self.discovery.resolve().await {
            Ok(projects) => projects,
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_discovery_error();
                }
                return Err(e);
            }
        };

        let results = stream::iter(projects)
            .map(|project| self.fetcher.fetch(project))
            .buffer_unordered(self.fetch_concurrency)
            .collect::<Vec<_>>()
            .await;

        let cycle = self.cycle.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = self.store.publish(Snapshot::new(cycle, results));
        let elapsed = started.elapsed();

        if let Some(metrics) = &self.metrics {
            metrics.record_success(elapsed, snapshot.completed_at, snapshot.len());
        }

        info!(
            cycle,
            projects = snapshot.len(),
            samples = snapshot.sample_count(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Scrape cycle complete"
        );
        Ok(snapshot)
    }

    /// Run cycles every `scrape_interval` until `cancel` fires. The first
    /// cycle starts immediately.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            scrape_target = %self.discovery.target(),
            interval = ?self.scrape_interval,
            concurrency = self.fetch_concurrency,
            "Starting scrape scheduler"
        );

        let mut tick = interval(self.scrape_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        result = self.run_cycle() => {
                            if let Err(e) = result {
                                error!(error = %e, "Scrape cycle skipped, keeping previous snapshot");
                            }
                        }
                    }
                }
            }
        }

        info!("Scrape scheduler shutting down");
    }
}

impl std::fmt::Debug for ScrapeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeScheduler")
            .field("discovery", &self.discovery)
            .field("scrape_interval", &self.scrape_interval)
            .field("fetch_concurrency", &self.fetch_concurrency)
            .field("cycle", &self.cycle.load(Ordering::SeqCst))
            .finish()
    }
}
