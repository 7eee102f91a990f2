//! Domain Ports (Port/Adapter Pattern)
//!
//! This module defines the value objects the scrape engine works on and the
//! ports (traits) it depends on to reach Google Cloud. Infrastructure
//! adapters implement these traits to provide concrete implementations.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │          ProjectDirectory │ QuotaSource              │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                  Adapters (Impls)                    │    │
//! │  │        GcpClient (Resource Manager, Service Usage,   │    │
//! │  │                   Compute)                           │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;

// =============================================================================
// Value Objects
// =============================================================================

/// Project identifier (value object).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A named limit/usage pair.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaRecord {
    pub metric: String,
    pub limit: f64,
    pub usage: f64,
}

impl QuotaRecord {
    pub fn new(metric: impl Into<String>, limit: f64, usage: f64) -> Self {
        Self {
            metric: metric.into(),
            limit,
            usage,
        }
    }
}

/// Quotas of one region, in the order the API returned them.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionQuotaSet {
    pub region: String,
    pub quotas: Vec<QuotaRecord>,
}

impl RegionQuotaSet {
    pub fn new(region: impl Into<String>, quotas: Vec<QuotaRecord>) -> Self {
        Self {
            region: region.into(),
            quotas,
        }
    }
}

/// Result of fetching one project.
///
/// `None` means the corresponding fetch failed; `Some(vec![])` means it
/// succeeded and reported no quotas.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSnapshot {
    pub project_id: ProjectId,
    pub global: Option<Vec<QuotaRecord>>,
    pub regions: Option<Vec<RegionQuotaSet>>,
}

impl ProjectSnapshot {
    /// Snapshot with both data sources absent.
    pub fn absent(project_id: ProjectId) -> Self {
        Self {
            project_id,
            global: None,
            regions: None,
        }
    }

    /// Whether the project-wide quota fetch succeeded
    pub fn global_up(&self) -> bool {
        self.global.is_some()
    }

    /// Whether the region list fetch succeeded
    pub fn regions_up(&self) -> bool {
        self.regions.is_some()
    }

    /// Number of exposition samples this project renders into.
    pub fn sample_count(&self) -> usize {
        let global = self.global.as_ref().map_or(0, Vec::len);
        let regional: usize = self
            .regions
            .iter()
            .flatten()
            .map(|r| r.quotas.len())
            .sum();

        global * 2 + regional * 2 + 2
    }
}

/// The complete, immutable result of one scrape cycle.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Sequence number of the cycle that produced it (0 = startup placeholder)
    pub cycle: u64,

    /// When the cycle finished
    pub completed_at: DateTime<Utc>,

    projects: BTreeMap<ProjectId, ProjectSnapshot>,
}

impl Snapshot {
    /// The placeholder published before the first cycle completes.
    pub fn empty() -> Self {
        Self {
            cycle: 0,
            completed_at: Utc::now(),
            projects: BTreeMap::new(),
        }
    }

    /// Build a snapshot from per-project results. Later duplicates win.
    pub fn new(cycle: u64, projects: impl IntoIterator<Item = ProjectSnapshot>) -> Self {
        Self {
            cycle,
            completed_at: Utc::now(),
            projects: projects
                .into_iter()
                .map(|p| (p.project_id.clone(), p))
                .collect(),
        }
    }

    pub fn get(&self, project_id: &ProjectId) -> Option<&ProjectSnapshot> {
        self.projects.get(project_id)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn projects(&self) -> impl Iterator<Item = &ProjectSnapshot> {
        self.projects.values()
    }

    pub fn project_ids(&self) -> impl Iterator<Item = &ProjectId> {
        self.projects.keys()
    }

    /// Total exposition samples for the whole snapshot.
    pub fn sample_count(&self) -> usize {
        self.projects().map(ProjectSnapshot::sample_count).sum()
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

// =============================================================================
// Project Directory Port
// =============================================================================

/// A project listed under a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderProject {
    pub project_id: ProjectId,
    /// Numeric project number, used by the Service Usage API
    pub project_number: String,
}

/// One page of a folder project listing.
#[derive(Debug, Clone, Default)]
pub struct ProjectPage {
    pub projects: Vec<FolderProject>,
    pub next_page_token: Option<String>,
}

/// One page of enabled service names.
#[derive(Debug, Clone, Default)]
pub struct ServicePage {
    /// Fully qualified names, e.g. `projects/123/services/compute.googleapis.com`
    pub services: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Port for enumerating projects and their enabled services.
///
/// Paging is driven by the caller so that the "list to completion" policy
/// lives in the discovery logic, not in each adapter.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    /// List one page of the projects whose direct parent is `folder`.
    async fn list_folder_projects(
        &self,
        folder: &str,
        page_token: Option<&str>,
    ) -> Result<ProjectPage>;

    /// List one page of the services in ENABLED state for a project.
    async fn list_enabled_services(
        &self,
        project: &FolderProject,
        page_token: Option<&str>,
    ) -> Result<ServicePage>;
}

// =============================================================================
// Quota Source Port
// =============================================================================

/// Port for reading quota data of one project.
#[async_trait]
pub trait QuotaSource: Send + Sync {
    /// Project-wide quotas.
    async fn project_quotas(&self, project: &ProjectId) -> Result<Vec<QuotaRecord>>;

    /// Every region of the project with its quotas.
    async fn region_quotas(&self, project: &ProjectId) -> Result<Vec<RegionQuotaSet>>;
}

// =============================================================================
// Tests
// =============================================================================
