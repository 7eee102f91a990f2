//! Quota Fetcher
//!
//! Fetches the project-wide quota list and the regional quota lists of one
//! project. The two calls run concurrently and fail independently; a failure
//! is recorded as absent data, never raised.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::domain::ports::{ProjectId, ProjectSnapshot, QuotaSource};
use crate::error::Error;

/// Fetches quota data for single projects
#[derive(Clone)]
pub struct QuotaFetcher {
    source: Arc<dyn QuotaSource>,
}

impl QuotaFetcher {
    pub fn new(source: Arc<dyn QuotaSource>) -> Self {
        Self { source }
    }

    /// Fetch both data sources of `project`.
    #[instrument(skip(self), fields(project = %project))]
    pub async fn fetch(&self, project: ProjectId) -> ProjectSnapshot {
        let (global, regions) = tokio::join!(
            self.source.project_quotas(&project),
            self.source.region_quotas(&project)
        );

        let global = global
            .map_err(|e| Error::GlobalQuotaFetch {
                project: project.to_string(),
                source: Box::new(e),
            })
            .inspect_err(|e| warn!(error = %e, "Project quotas unavailable"))
            .ok();

        let regions = regions
            .map_err(|e| Error::RegionQuotaFetch {
                project: project.to_string(),
                source: Box::new(e),
            })
            .inspect_err(|e| warn!(error = %e, "Region quotas unavailable"))
            .ok();

        debug!(
            global = global.as_ref().map(Vec::len),
            regions = regions.as_ref().map(Vec::len),
            "Fetched project quotas"
        );

        ProjectSnapshot {
            project_id: project,
            global,
            regions,
        }
    }
}

impl std::fmt::Debug for QuotaFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaFetcher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryCloud;
    use crate::domain::ports::{QuotaRecord, RegionQuotaSet};

    fn seeded_cloud() -> Arc<InMemoryCloud> {
        let cloud = Arc::new(InMemoryCloud::new());
        cloud.set_project_quotas(
            "p",
            vec![
                QuotaRecord::new("SNAPSHOTS", 5000.0, 3.0),
                QuotaRecord::new("NETWORKS", 15.0, 1.0),
            ],
        );
        cloud.set_region_quotas(
            "p",
            vec![RegionQuotaSet::new(
                "us-central1",
                vec![QuotaRecord::new("CPUS", 24.0, 8.0)],
            )],
        );
        cloud
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let fetcher = QuotaFetcher::new(seeded_cloud());

        let snapshot = fetcher.fetch(ProjectId::new("p")).await;

        assert_eq!(snapshot.project_id, ProjectId::new("p"));
        assert_eq!(snapshot.global.as_ref().unwrap().len(), 2);
        assert_eq!(snapshot.regions.as_ref().unwrap()[0].region, "us-central1");
    }

    #[tokio::test]
    async fn test_global_failure_leaves_regions_intact() {
        let cloud = seeded_cloud();
        cloud.fail_project_quotas("p", true);
        let fetcher = QuotaFetcher::new(cloud);

        let snapshot = fetcher.fetch(ProjectId::new("p")).await;

        assert!(snapshot.global.is_none());
        assert!(!snapshot.global_up());
        assert_eq!(snapshot.regions.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_region_failure_leaves_global_intact() {
        let cloud = seeded_cloud();
        cloud.fail_region_quotas("p", true);
        let fetcher = QuotaFetcher::new(cloud);

        let snapshot = fetcher.fetch(ProjectId::new("p")).await;

        assert_eq!(snapshot.global.unwrap().len(), 2);
        assert!(snapshot.regions.is_none());
    }

    #[tokio::test]
    async fn test_both_failures() {
        let cloud = seeded_cloud();
        cloud.fail_project_quotas("p", true);
        cloud.fail_region_quotas("p", true);
        let fetcher = QuotaFetcher::new(cloud);

        let snapshot = fetcher.fetch(ProjectId::new("p")).await;

        assert_eq!(snapshot, ProjectSnapshot::absent(ProjectId::new("p")));
    }

    #[tokio::test]
    async fn test_unknown_project_is_present_but_empty() {
        let fetcher = QuotaFetcher::new(Arc::new(InMemoryCloud::new()));

        let snapshot = fetcher.fetch(ProjectId::new("fresh")).await;

        assert_eq!(snapshot.global, Some(vec![]));
        assert_eq!(snapshot.regions, Some(vec![]));
    }
}
