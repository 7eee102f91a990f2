//! GCP Quota Exporter - Prometheus exporter for Google Cloud quotas
//!
//! Periodically reads the project-wide and regional Compute Engine quotas of
//! one project, or of every project under a folder that has the Compute API
//! enabled, and serves them as Prometheus gauges.
//!
//! # Architecture
//!
//! ```text
//! ProjectDiscovery → QuotaFetcher (per project) → SnapshotStore → QuotaCollector
//!         └──────────── ScrapeScheduler ──────────────┘            (scrape time)
//! ```
//!
//! The scheduler is the only writer of the snapshot store. Prometheus scrapes
//! read the latest complete snapshot and never trigger API calls.
//!
//! # Modules
//!
//! - [`adapters`] - Google API client, retry policy, credentials, in-memory cloud
//! - [`config`] - Exporter configuration
//! - [`discovery`] - Project set resolution
//! - [`domain`] - Quota value objects and ports
//! - [`error`] - Error types
//! - [`fetcher`] - Per-project quota fetch
//! - [`metrics`] - Prometheus collector and self-metrics
//! - [`scheduler`] - Periodic scrape loop
//! - [`server`] - HTTP exposition
//! - [`snapshot`] - Atomically swapped snapshot holder

pub mod adapters;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod scheduler;
pub mod server;
pub mod snapshot;

// Re-export commonly used types
pub use config::{ExporterConfig, ScrapeTarget};
pub use discovery::ProjectDiscovery;
pub use error::{Error, Result};
pub use fetcher::QuotaFetcher;
pub use scheduler::ScrapeScheduler;
pub use snapshot::SnapshotStore;
