//! Project Discovery
//!
//! Resolves the set of projects to scrape. A single configured project is
//! used as-is; a folder is listed one level deep and filtered down to the
//! projects that have the required service enabled.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, instrument, warn};

use crate::config::{ExporterConfig, ScrapeTarget};
use crate::domain::ports::{FolderProject, ProjectDirectory, ProjectId};
use crate::error::{Error, Result};

/// Service checks running at once during folder discovery
const SERVICE_CHECK_CONCURRENCY: usize = 8;

/// Whether a fully qualified service name refers to `service`.
///
/// Accepts both `compute.googleapis.com` and
/// `projects/123/services/compute.googleapis.com`.
pub fn service_matches(name: &str, service: &str) -> bool {
    name == service
        || name
            .rsplit_once("/services/")
            .is_some_and(|(_, tail)| tail == service)
}

/// Resolves which projects a scrape cycle covers
pub struct ProjectDiscovery {
    target: ScrapeTarget,
    required_service: String,
    directory: Arc<dyn ProjectDirectory>,
}

impl ProjectDiscovery {
    pub fn new(
        target: ScrapeTarget,
        required_service: impl Into<String>,
        directory: Arc<dyn ProjectDirectory>,
    ) -> Self {
        Self {
            target,
            required_service: required_service.into(),
            directory,
        }
    }

    pub fn from_config(config: &ExporterConfig, directory: Arc<dyn ProjectDirectory>) -> Self {
        Self::new(
            config.target.clone(),
            config.required_service.clone(),
            directory,
        )
    }

    pub fn target(&self) -> &ScrapeTarget {
        &self.target
    }

    /// Resolve the project set for one cycle.
    ///
    /// Only a failure to enumerate the folder is an error; a project whose
    /// service check fails is left out.
    #[instrument(skip(self), fields(target = %self.target))]
    pub async fn resolve(&self) -> Result<Vec<ProjectId>> {
        match &self.target {
            ScrapeTarget::Project(id) => Ok(vec![ProjectId::new(id.clone())]),
            ScrapeTarget::Folder(folder) => {
                let candidates = self.list_folder(folder).await.map_err(|e| {
                    Error::DiscoveryEnumeration {
                        folder: folder.clone(),
                        source: Box::new(e),
                    }
                })?;

                let checks = stream::iter(candidates)
                    .map(|project| async move {
                        let enabled = self.service_enabled(&project).await;
                        (project, enabled)
                    })
                    .buffered(SERVICE_CHECK_CONCURRENCY)
                    .collect::<Vec<_>>()
                    .await;

                let mut resolved = Vec::with_capacity(checks.len());
                for (project, enabled) in checks {
                    match enabled {
                        Ok(true) => resolved.push(project.project_id),
                        Ok(false) => debug!(
                            project = %project.project_id,
                            service = %self.required_service,
                            "Service not enabled, skipping project"
                        ),
                        Err(e) => warn!(
                            project = %project.project_id,
                            error = %e,
                            "Service check failed, treating project as not enabled"
                        ),
                    }
                }

                info!(
                    folder = %folder,
                    projects = resolved.len(),
                    "Resolved folder projects"
                );
                Ok(resolved)
            }
        }
    }

    /// Page through the folder listing to completion.
    async fn list_folder(&self, folder: &str) -> Result<Vec<FolderProject>> {
        let mut projects = Vec::new();
        let mut seen = HashSet::new();
        let mut tokens = HashSet::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .directory
                .list_folder_projects(folder, page_token.as_deref())
                .await?;

            for project in page.projects {
                if seen.insert(project.project_id.clone()) {
                    projects.push(project);
                }
            }

            match page.next_page_token {
                Some(token) if tokens.insert(token.clone()) => page_token = Some(token),
                Some(token) => {
                    return Err(Error::ResponseParse(format!(
                        "project listing repeated page token {}",
                        token
                    )))
                }
                None => break,
            }
        }

        debug!(folder = %folder, candidates = projects.len(), "Listed folder");
        Ok(projects)
    }

    /// Scan the project's enabled services for the required one.
    async fn service_enabled(&self, project: &FolderProject) -> Result<bool> {
        let mut tokens = HashSet::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .directory
                .list_enabled_services(project, page_token.as_deref())
                .await
                .map_err(|e| Error::ServiceCheck {
                    project: project.project_id.to_string(),
                    source: Box::new(e),
                })?;

            if page
                .services
                .iter()
                .any(|name| service_matches(name, &self.required_service))
            {
                return Ok(true);
            }

            match page.next_page_token {
                Some(token) if tokens.insert(token.clone()) => page_token = Some(token),
                Some(token) => {
                    return Err(Error::ServiceCheck {
                        project: project.project_id.to_string(),
                        source: Box::new(Error::ResponseParse(format!(
                            "service listing repeated page token {}",
                            token
                        ))),
                    })
                }
                None => return Ok(false),
            }
        }
    }
}

impl std::fmt::Debug for ProjectDiscovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectDiscovery")
            .field("target", &self.target)
            .field("required_service", &self.required_service)
            .finish()
    }
}
