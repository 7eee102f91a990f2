//! In-Memory Cloud Adapter
//!
//! Implements both ports from in-memory data with switchable failures.
//! Useful for tests and for running the scrape engine without credentials.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::ports::{
    FolderProject, ProjectDirectory, ProjectId, ProjectPage, QuotaRecord, QuotaSource,
    RegionQuotaSet, ServicePage,
};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct CloudState {
    folders: HashMap<String, Vec<FolderProject>>,
    services: HashMap<ProjectId, Vec<String>>,
    project_quotas: HashMap<ProjectId, Vec<QuotaRecord>>,
    region_quotas: HashMap<ProjectId, Vec<RegionQuotaSet>>,
    failing_folders: HashSet<String>,
    failing_service_checks: HashSet<ProjectId>,
    failing_project_quotas: HashSet<ProjectId>,
    failing_region_quotas: HashSet<ProjectId>,
}

/// In-memory stand-in for the Google APIs.
#[derive(Debug)]
pub struct InMemoryCloud {
    state: RwLock<CloudState>,
    page_size: usize,
    calls: AtomicUsize,
}

impl Default for InMemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCloud {
    /// Create an empty cloud listing two projects per page.
    pub fn new() -> Self {
        Self::with_page_size(2)
    }

    /// Create an empty cloud with a custom listing page size.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: RwLock::new(CloudState::default()),
            page_size: page_size.max(1),
            calls: AtomicUsize::new(0),
        }
    }

    /// Put a project under a folder with the given enabled services.
    pub fn add_folder_project(&self, folder: &str, project: &str, services: &[&str]) {
        let mut state = self.state.write();
        let number = format!("{}", 1000 + state.services.len());
        let project_id = ProjectId::new(project);

        state
            .folders
            .entry(folder.to_string())
            .or_default()
            .push(FolderProject {
                project_id: project_id.clone(),
                project_number: number.clone(),
            });
        state.services.insert(
            project_id,
            services
                .iter()
                .map(|s| format!("projects/{}/services/{}", number, s))
                .collect(),
        );
    }

    pub fn set_project_quotas(&self, project: &str, quotas: Vec<QuotaRecord>) {
        self.state
            .write()
            .project_quotas
            .insert(ProjectId::new(project), quotas);
    }

    pub fn set_region_quotas(&self, project: &str, regions: Vec<RegionQuotaSet>) {
        self.state
            .write()
            .region_quotas
            .insert(ProjectId::new(project), regions);
    }

    pub fn fail_folder_listing(&self, folder: &str, failing: bool) {
        toggle(&mut self.state.write().failing_folders, folder.to_string(), failing);
    }

    pub fn fail_service_check(&self, project: &str, failing: bool) {
        toggle(
            &mut self.state.write().failing_service_checks,
            ProjectId::new(project),
            failing,
        );
    }

    pub fn fail_project_quotas(&self, project: &str, failing: bool) {
        toggle(
            &mut self.state.write().failing_project_quotas,
            ProjectId::new(project),
            failing,
        );
    }

    pub fn fail_region_quotas(&self, project: &str, failing: bool) {
        toggle(
            &mut self.state.write().failing_region_quotas,
            ProjectId::new(project),
            failing,
        );
    }

    /// Remove a project from every folder.
    pub fn remove_project(&self, project: &str) {
        let project_id = ProjectId::new(project);
        let mut state = self.state.write();
        for projects in state.folders.values_mut() {
            projects.retain(|p| p.project_id != project_id);
        }
    }

    /// Number of port calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn toggle<T: Eq + std::hash::Hash>(set: &mut HashSet<T>, key: T, on: bool) {
    if on {
        set.insert(key);
    } else {
        set.remove(&key);
    }
}

fn unavailable(what: String) -> Error {
    Error::ApiStatus {
        url: what,
        status: 503,
        body: "Service Unavailable".to_string(),
    }
}

fn page_offset(page_token: Option<&str>) -> Result<usize> {
    page_token
        .map(|t| {
            t.parse::<usize>()
                .map_err(|_| Error::ResponseParse(format!("invalid page token {}", t)))
        })
        .transpose()
        .map(|offset| offset.unwrap_or(0))
}

#[async_trait]
impl ProjectDirectory for InMemoryCloud {
    async fn list_folder_projects(
        &self,
        folder: &str,
        page_token: Option<&str>,
    ) -> Result<ProjectPage> {
        self.record_call();
        let state = self.state.read();

        if state.failing_folders.contains(folder) {
            return Err(unavailable(format!("folders/{}", folder)));
        }

        let all = state.folders.get(folder).map(Vec::as_slice).unwrap_or(&[]);
        let offset = page_offset(page_token)?;
        let end = (offset + self.page_size).min(all.len());
        let projects = all.get(offset..end).unwrap_or(&[]).to_vec();

        Ok(ProjectPage {
            projects,
            next_page_token: (end < all.len()).then(|| end.to_string()),
        })
    }

    async fn list_enabled_services(
        &self,
        project: &FolderProject,
        page_token: Option<&str>,
    ) -> Result<ServicePage> {
        self.record_call();
        let state = self.state.read();

        if state.failing_service_checks.contains(&project.project_id) {
            return Err(unavailable(format!("services/{}", project.project_id)));
        }

        // One service per page so callers must follow tokens.
        let all = state
            .services
            .get(&project.project_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let offset = page_offset(page_token)?;

        Ok(ServicePage {
            services: all.get(offset).cloned().into_iter().collect(),
            next_page_token: (offset + 1 < all.len()).then(|| (offset + 1).to_string()),
        })
    }
}

#[async_trait]
impl QuotaSource for InMemoryCloud {
    async fn project_quotas(&self, project: &ProjectId) -> Result<Vec<QuotaRecord>> {
        self.record_call();
        let state = self.state.read();

        if state.failing_project_quotas.contains(project) {
            return Err(unavailable(format!("projects/{}", project)));
        }
        Ok(state.project_quotas.get(project).cloned().unwrap_or_default())
    }

    async fn region_quotas(&self, project: &ProjectId) -> Result<Vec<RegionQuotaSet>> {
        self.record_call();
        let state = self.state.read();

        if state.failing_region_quotas.contains(project) {
            return Err(unavailable(format!("projects/{}/regions", project)));
        }
        Ok(state.region_quotas.get(project).cloned().unwrap_or_default())
    }
}
