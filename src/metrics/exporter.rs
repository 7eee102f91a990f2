//! Quota Exporter - renders the current snapshot into Prometheus gauges
//!
//! The collector owns no quota state. Every collect reads the latest
//! snapshot from the store and builds fresh metric families from it, so
//! concurrent scrapes never interfere and the snapshot is never mutated.

use std::collections::HashSet;
use std::sync::Arc;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{GaugeVec, Opts};
use tracing::{debug, error, warn};

use crate::domain::ports::Snapshot;
use crate::error::Result;
use crate::snapshot::SnapshotStore;

const QUOTA_LABELS: [&str; 3] = ["project", "region", "metric"];
const UP_LABELS: [&str; 1] = ["project"];

// =============================================================================
// Samples
// =============================================================================

/// The four exported metric families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaFamily {
    Limit,
    Usage,
    ProjectUp,
    RegionsUp,
}

impl QuotaFamily {
    pub const ALL: [QuotaFamily; 4] = [
        QuotaFamily::Limit,
        QuotaFamily::Usage,
        QuotaFamily::ProjectUp,
        QuotaFamily::RegionsUp,
    ];

    /// Metric name without namespace
    pub fn name(&self) -> &'static str {
        match self {
            QuotaFamily::Limit => "quota_limit",
            QuotaFamily::Usage => "quota_usage",
            QuotaFamily::ProjectUp => "quota_project_up",
            QuotaFamily::RegionsUp => "quota_regions_up",
        }
    }

    pub fn help(&self) -> &'static str {
        match self {
            QuotaFamily::Limit => "quota limits for GCP components",
            QuotaFamily::Usage => "quota usage for GCP components",
            QuotaFamily::ProjectUp => "Was the last scrape of the Google Project API successful.",
            QuotaFamily::RegionsUp => "Was the last scrape of the Google Regions API successful.",
        }
    }

    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            QuotaFamily::Limit | QuotaFamily::Usage => &QUOTA_LABELS,
            QuotaFamily::ProjectUp | QuotaFamily::RegionsUp => &UP_LABELS,
        }
    }

    fn opts(&self, namespace: &str) -> Opts {
        Opts::new(self.name(), self.help()).namespace(namespace)
    }
}

/// One exposition sample
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaSample {
    pub family: QuotaFamily,
    /// Label values in the order of `family.labels()`
    pub labels: Vec<String>,
    pub value: f64,
}

impl QuotaSample {
    fn quota(family: QuotaFamily, project: &str, region: &str, metric: &str, value: f64) -> Self {
        Self {
            family,
            labels: vec![project.to_string(), region.to_string(), metric.to_string()],
            value,
        }
    }

    fn up(family: QuotaFamily, project: &str, up: bool) -> Self {
        Self {
            family,
            labels: vec![project.to_string()],
            value: if up { 1.0 } else { 0.0 },
        }
    }
}

/// Render every sample of a snapshot. Global quotas carry an empty region label.
pub fn render_samples(snapshot: &Snapshot) -> Vec<QuotaSample> {
    let mut samples = Vec::with_capacity(snapshot.sample_count());

    for project in snapshot.projects() {
        let name = project.project_id.as_str();

        if let Some(quotas) = &project.global {
            for quota in quotas {
                samples.push(QuotaSample::quota(QuotaFamily::Limit, name, "", &quota.metric, quota.limit));
                samples.push(QuotaSample::quota(QuotaFamily::Usage, name, "", &quota.metric, quota.usage));
            }
        }
        samples.push(QuotaSample::up(QuotaFamily::ProjectUp, name, project.global_up()));

        if let Some(regions) = &project.regions {
            for region in regions {
                for quota in &region.quotas {
                    samples.push(QuotaSample::quota(
                        QuotaFamily::Limit,
                        name,
                        &region.region,
                        &quota.metric,
                        quota.limit,
                    ));
                    samples.push(QuotaSample::quota(
                        QuotaFamily::Usage,
                        name,
                        &region.region,
                        &quota.metric,
                        quota.usage,
                    ));
                }
            }
        }
        samples.push(QuotaSample::up(QuotaFamily::RegionsUp, name, project.regions_up()));
    }

    samples
}

// =============================================================================
// Collector
// =============================================================================

/// Prometheus collector exposing the snapshot held by a [`SnapshotStore`]
pub struct QuotaCollector {
    namespace: String,
    store: Arc<SnapshotStore>,
    /// Never populated; kept for their descriptors
    templates: Vec<GaugeVec>,
}

impl QuotaCollector {
    /// Build the collector and validate its descriptors once.
    pub fn new(namespace: &str, store: Arc<SnapshotStore>) -> Result<Self> {
        let templates = QuotaFamily::ALL
            .iter()
            .map(|family| GaugeVec::new(family.opts(namespace), family.labels()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            namespace: namespace.to_string(),
            store,
            templates,
        })
    }

    fn family_vecs(&self) -> Result<Vec<(QuotaFamily, GaugeVec)>> {
        QuotaFamily::ALL
            .iter()
            .map(|family| {
                GaugeVec::new(family.opts(&self.namespace), family.labels())
                    .map(|vec| (*family, vec))
                    .map_err(Into::into)
            })
            .collect()
    }
}

impl Collector for QuotaCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.templates.iter().flat_map(|t| t.desc()).collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let snapshot = self.store.read();

        let vecs = match self.family_vecs() {
            Ok(vecs) => vecs,
            Err(e) => {
                error!(error = %e, "Failed to build quota metric families");
                return Vec::new();
            }
        };

        let samples = render_samples(&snapshot);
        let collisions = label_collisions(&samples);
        if collisions > 0 {
            warn!(
                cycle = snapshot.cycle,
                collisions, "Quota samples share labels, later values overwrite earlier ones"
            );
        }

        for sample in &samples {
            let labels: Vec<&str> = sample.labels.iter().map(String::as_str).collect();
            if let Some((_, vec)) = vecs.iter().find(|(family, _)| *family == sample.family) {
                vec.with_label_values(labels.as_slice()).set(sample.value);
            }
        }

        debug!(
            cycle = snapshot.cycle,
            projects = snapshot.len(),
            "Collected quota metrics"
        );

        vecs.iter().flat_map(|(_, vec)| vec.collect()).collect()
    }
}

/// Samples whose family and label values repeat an earlier sample.
fn label_collisions(samples: &[QuotaSample]) -> usize {
    let mut seen = HashSet::with_capacity(samples.len());
    samples
        .iter()
        .filter(|sample| !seen.insert((sample.family, sample.labels.as_slice())))
        .count()
}

impl std::fmt::Debug for QuotaCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaCollector")
            .field("namespace", &self.namespace)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{ProjectId, ProjectSnapshot, QuotaRecord, RegionQuotaSet};
    use prometheus::{Encoder, Registry, TextEncoder};

    fn healthy_project() -> ProjectSnapshot {
        ProjectSnapshot {
            project_id: ProjectId::new("alpha"),
            global: Some(vec![
                QuotaRecord::new("SNAPSHOTS", 5000.0, 3.0),
                QuotaRecord::new("NETWORKS", 15.0, 1.0),
            ]),
            regions: Some(vec![
                RegionQuotaSet::new("us-central1", vec![QuotaRecord::new("CPUS", 24.0, 8.0)]),
                RegionQuotaSet::new("europe-west1", vec![]),
            ]),
        }
    }

    fn encode(collector: QuotaCollector) -> String {
        let registry = Registry::new();
        registry.register(Box::new(collector)).unwrap();

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .unwrap();
        String::from_utf8(buffer).unwrap()
    }

    // =========================================================================
    // Rendering Tests
    // =========================================================================

    #[test]
    fn test_render_healthy_project() {
        let snapshot = Snapshot::new(1, vec![healthy_project()]);
        let samples = render_samples(&snapshot);

        assert_eq!(samples.len(), 2 * 2 + 1 * 2 + 2);
        assert_eq!(samples.len(), snapshot.sample_count());

        assert!(samples.contains(&QuotaSample {
            family: QuotaFamily::Limit,
            labels: vec!["alpha".into(), "".into(), "SNAPSHOTS".into()],
            value: 5000.0,
        }));
        assert!(samples.contains(&QuotaSample {
            family: QuotaFamily::Usage,
            labels: vec!["alpha".into(), "us-central1".into(), "CPUS".into()],
            value: 8.0,
        }));
        assert!(samples.contains(&QuotaSample {
            family: QuotaFamily::ProjectUp,
            labels: vec!["alpha".into()],
            value: 1.0,
        }));
        assert!(samples.contains(&QuotaSample {
            family: QuotaFamily::RegionsUp,
            labels: vec!["alpha".into()],
            value: 1.0,
        }));
    }

    #[test]
    fn test_render_absent_global() {
        let mut project = healthy_project();
        project.global = None;
        let samples = render_samples(&Snapshot::new(1, vec![project]));

        let global: Vec<_> = samples
            .iter()
            .filter(|s| s.labels.len() == 3 && s.labels[1].is_empty())
            .collect();
        assert!(global.is_empty());

        let up = samples
            .iter()
            .find(|s| s.family == QuotaFamily::ProjectUp)
            .unwrap();
        assert_eq!(up.value, 0.0);

        let regions_up = samples
            .iter()
            .find(|s| s.family == QuotaFamily::RegionsUp)
            .unwrap();
        assert_eq!(regions_up.value, 1.0);
    }

    #[test]
    fn test_render_absent_regions() {
        let mut project = healthy_project();
        project.regions = None;
        let samples = render_samples(&Snapshot::new(1, vec![project]));

        assert_eq!(samples.len(), 2 * 2 + 2);
        let regions_up = samples
            .iter()
            .find(|s| s.family == QuotaFamily::RegionsUp)
            .unwrap();
        assert_eq!(regions_up.value, 0.0);
    }

    #[test]
    fn test_render_empty_snapshot() {
        assert!(render_samples(&Snapshot::empty()).is_empty());
    }

    #[test]
    fn test_family_names() {
        assert_eq!(QuotaFamily::Limit.name(), "quota_limit");
        assert_eq!(QuotaFamily::Usage.name(), "quota_usage");
        assert_eq!(QuotaFamily::ProjectUp.name(), "quota_project_up");
        assert_eq!(QuotaFamily::RegionsUp.name(), "quota_regions_up");
        assert_eq!(QuotaFamily::Limit.labels(), &["project", "region", "metric"]);
        assert_eq!(QuotaFamily::RegionsUp.labels(), &["project"]);
    }

    // =========================================================================
    // Collector Tests
    // =========================================================================

    #[test]
    fn test_collector_descriptors() {
        let collector = QuotaCollector::new("gcp", Arc::new(SnapshotStore::new())).unwrap();
        let names: Vec<String> = collector
            .desc()
            .iter()
            .map(|d| d.fq_name.clone())
            .collect();

        assert_eq!(
            names,
            vec![
                "gcp_quota_limit",
                "gcp_quota_usage",
                "gcp_quota_project_up",
                "gcp_quota_regions_up"
            ]
        );
    }

    #[test]
    fn test_collector_rejects_bad_namespace() {
        assert!(QuotaCollector::new("bad namespace", Arc::new(SnapshotStore::new())).is_err());
    }

    #[test]
    fn test_collector_exposition() {
        let store = Arc::new(SnapshotStore::new());
        let mut degraded = healthy_project();
        degraded.project_id = ProjectId::new("beta");
        degraded.global = None;
        store.publish(Snapshot::new(1, vec![healthy_project(), degraded]));

        let text = encode(QuotaCollector::new("gcp", store).unwrap());

        assert!(text.contains(r#"gcp_quota_limit{metric="SNAPSHOTS",project="alpha",region=""} 5000"#));
        assert!(text.contains(r#"gcp_quota_usage{metric="CPUS",project="alpha",region="us-central1"} 8"#));
        assert!(text.contains(r#"gcp_quota_project_up{project="alpha"} 1"#));
        assert!(text.contains(r#"gcp_quota_project_up{project="beta"} 0"#));
        assert!(text.contains(r#"gcp_quota_regions_up{project="beta"} 1"#));
        assert!(!text.contains(r#"project="beta",region=""}"#));
    }

    #[test]
    fn test_duplicate_metric_collides() {
        let mut project = healthy_project();
        project.global = Some(vec![
            QuotaRecord::new("SNAPSHOTS", 5000.0, 3.0),
            QuotaRecord::new("SNAPSHOTS", 6000.0, 4.0),
        ]);
        let snapshot = Snapshot::new(1, vec![project]);
        let samples = render_samples(&snapshot);

        assert_eq!(label_collisions(&samples), 2);
        let clean = Snapshot::new(1, vec![healthy_project()]);
        assert_eq!(label_collisions(&render_samples(&clean)), 0);

        let store = Arc::new(SnapshotStore::new());
        store.publish(snapshot);
        let text = encode(QuotaCollector::new("gcp", store).unwrap());
        let exposed = text.lines().filter(|l| l.starts_with("gcp_quota_")).count();

        assert_eq!(exposed, samples.len() - 2);
        assert!(text.contains(r#"gcp_quota_limit{metric="SNAPSHOTS",project="alpha",region=""} 6000"#));
    }

    #[test]
    fn test_collector_follows_store() {
        let store = Arc::new(SnapshotStore::new());
        let registry = Registry::new();
        registry
            .register(Box::new(QuotaCollector::new("gcp", store.clone()).unwrap()))
            .unwrap();
        let gather = || {
            let mut buffer = Vec::new();
            TextEncoder::new()
                .encode(&registry.gather(), &mut buffer)
                .unwrap();
            String::from_utf8(buffer).unwrap()
        };

        assert!(!gather().contains("project="));

        store.publish(Snapshot::new(1, vec![healthy_project()]));
        let text = gather();
        let samples = text.lines().filter(|l| l.starts_with("gcp_quota_")).count();
        assert_eq!(samples, 8);

        store.publish(Snapshot::new(2, vec![]));
        assert!(!gather().contains("project="));
    }
}
