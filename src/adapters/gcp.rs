//! Google Cloud Adapter
//!
//! Implements the `ProjectDirectory` and `QuotaSource` ports against the
//! Cloud Resource Manager v1, Service Usage v1 and Compute v1 REST APIs.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tracing::{debug, instrument};

use super::transport::ApiTransport;
use crate::config::ApiEndpoints;
use crate::domain::ports::{
    FolderProject, ProjectDirectory, ProjectId, ProjectPage, QuotaRecord, QuotaSource,
    RegionQuotaSet, ServicePage,
};
use crate::error::{Error, Result};

// =============================================================================
// Google API Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListProjectsResponse {
    #[serde(default)]
    projects: Vec<ResourceManagerProject>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceManagerProject {
    project_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    project_number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListServicesResponse {
    #[serde(default)]
    services: Vec<ServiceEntry>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ComputeProject {
    #[serde(default)]
    quotas: Vec<ComputeQuota>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegionList {
    #[serde(default)]
    items: Vec<ComputeRegion>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ComputeRegion {
    name: String,
    #[serde(default)]
    quotas: Vec<ComputeQuota>,
}

#[derive(Debug, Deserialize)]
struct ComputeQuota {
    metric: String,
    #[serde(default)]
    limit: f64,
    #[serde(default)]
    usage: f64,
}

impl From<ComputeQuota> for QuotaRecord {
    fn from(q: ComputeQuota) -> Self {
        QuotaRecord::new(q.metric, q.limit, q.usage)
    }
}

/// int64 fields arrive as JSON strings; accept plain numbers too.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

fn non_empty(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.is_empty())
}

// =============================================================================
// GCP Client
// =============================================================================

/// REST client for the Google APIs used by the exporter
#[derive(Debug, Clone)]
pub struct GcpClient {
    transport: ApiTransport,
    endpoints: ApiEndpoints,
}

impl GcpClient {
    pub fn new(transport: ApiTransport, endpoints: ApiEndpoints) -> Self {
        Self {
            transport,
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &ApiEndpoints {
        &self.endpoints
    }

    fn projects_url(&self) -> String {
        format!("{}v1/projects", self.endpoints.resource_manager)
    }

    fn services_url(&self, project_number: &str) -> String {
        format!(
            "{}v1/projects/{}/services",
            self.endpoints.service_usage, project_number
        )
    }

    fn compute_project_url(&self, project: &ProjectId) -> String {
        format!("{}projects/{}", self.endpoints.compute, project)
    }

    fn regions_url(&self, project: &ProjectId) -> String {
        format!("{}projects/{}/regions", self.endpoints.compute, project)
    }
}

#[async_trait]
impl ProjectDirectory for GcpClient {
    #[instrument(skip(self))]
    async fn list_folder_projects(
        &self,
        folder: &str,
        page_token: Option<&str>,
    ) -> Result<ProjectPage> {
        let filter = format!("parent.id={}", folder);
        let mut query = vec![("filter", filter.as_str())];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response: ListProjectsResponse =
            self.transport.get_json(&self.projects_url(), &query).await?;

        debug!(count = response.projects.len(), "Listed folder projects page");

        Ok(ProjectPage {
            projects: response
                .projects
                .into_iter()
                .map(|p| FolderProject {
                    project_id: ProjectId::new(p.project_id),
                    project_number: p.project_number,
                })
                .collect(),
            next_page_token: non_empty(response.next_page_token),
        })
    }

    #[instrument(skip(self), fields(project = %project.project_id))]
    async fn list_enabled_services(
        &self,
        project: &FolderProject,
        page_token: Option<&str>,
    ) -> Result<ServicePage> {
        // Service Usage addresses projects by number; fall back to the id.
        let parent = if project.project_number.is_empty() {
            project.project_id.as_str()
        } else {
            project.project_number.as_str()
        };

        let mut query = vec![("filter", "state:ENABLED")];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let response: ListServicesResponse = self
            .transport
            .get_json(&self.services_url(parent), &query)
            .await?;

        Ok(ServicePage {
            services: response.services.into_iter().map(|s| s.name).collect(),
            next_page_token: non_empty(response.next_page_token),
        })
    }
}

#[async_trait]
impl QuotaSource for GcpClient {
    #[instrument(skip(self), fields(project = %project))]
    async fn project_quotas(&self, project: &ProjectId) -> Result<Vec<QuotaRecord>> {
        let response: ComputeProject = self
            .transport
            .get_json(&self.compute_project_url(project), &[])
            .await?;

        Ok(response.quotas.into_iter().map(QuotaRecord::from).collect())
    }

    #[instrument(skip(self), fields(project = %project))]
    async fn region_quotas(&self, project: &ProjectId) -> Result<Vec<RegionQuotaSet>> {
        let url = self.regions_url(project);
        let mut regions = Vec::new();
        let mut tokens = HashSet::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = Vec::new();
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response: RegionList = self.transport.get_json(&url, &query).await?;

            regions.extend(response.items.into_iter().map(|r| {
                RegionQuotaSet::new(r.name, r.quotas.into_iter().map(QuotaRecord::from).collect())
            }));

            match non_empty(response.next_page_token) {
                Some(token) if tokens.insert(token.clone()) => page_token = Some(token),
                Some(token) => {
                    return Err(Error::ResponseParse(format!(
                        "region listing repeated page token {}",
                        token
                    )))
                }
                None => break,
            }
        }

        debug!(regions = regions.len(), "Fetched region quotas");
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{RetryPolicy, TokenSource};
    use std::sync::Arc;
    use std::time::Duration;

    fn client(endpoints: ApiEndpoints) -> GcpClient {
        let transport = ApiTransport::new(
            Duration::from_secs(5),
            RetryPolicy::none(),
            Arc::new(TokenSource::Anonymous),
        )
        .unwrap();
        GcpClient::new(transport, endpoints)
    }

    // =========================================================================
    // URL Tests
    // =========================================================================

    #[test]
    fn test_default_urls() {
        let client = client(ApiEndpoints::default());
        let project = ProjectId::new("my-project");

        assert_eq!(
            client.projects_url(),
            "https://cloudresourcemanager.googleapis.com/v1/projects"
        );
        assert_eq!(
            client.services_url("123"),
            "https://serviceusage.googleapis.com/v1/projects/123/services"
        );
        assert_eq!(
            client.compute_project_url(&project),
            "https://compute.googleapis.com/compute/v1/projects/my-project"
        );
        assert_eq!(
            client.regions_url(&project),
            "https://compute.googleapis.com/compute/v1/projects/my-project/regions"
        );
    }

    #[test]
    fn test_base_path_urls() {
        let client = client(ApiEndpoints::with_base_path("http://localhost:8080"));
        let project = ProjectId::new("503");

        assert_eq!(client.compute_project_url(&project), "http://localhost:8080/projects/503");
        assert_eq!(client.projects_url(), "http://localhost:8080/v1/projects");
    }

    // =========================================================================
    // Response Parsing Tests
    // =========================================================================

    #[test]
    fn test_list_projects_deserialize() {
        let json = r#"{
            "projects": [
                {"projectNumber": "415104041262", "projectId": "alpha", "lifecycleState": "ACTIVE"},
                {"projectNumber": 99, "projectId": "beta"}
            ],
            "nextPageToken": "abc"
        }"#;

        let response: ListProjectsResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.projects.len(), 2);
        assert_eq!(response.projects[0].project_id, "alpha");
        assert_eq!(response.projects[0].project_number, "415104041262");
        assert_eq!(response.projects[1].project_number, "99");
        assert_eq!(response.next_page_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_list_projects_empty_folder() {
        let response: ListProjectsResponse = serde_json::from_str("{}").unwrap();

        assert!(response.projects.is_empty());
        assert!(response.next_page_token.is_none());
    }

    #[test]
    fn test_list_services_deserialize() {
        let json = r#"{
            "services": [
                {
                    "name": "projects/123/services/compute.googleapis.com",
                    "config": {"name": "compute.googleapis.com"},
                    "state": "ENABLED"
                }
            ]
        }"#;

        let response: ListServicesResponse = serde_json::from_str(json).unwrap();

        assert_eq!(response.services.len(), 1);
        assert_eq!(
            response.services[0].name,
            "projects/123/services/compute.googleapis.com"
        );
    }

    #[test]
    fn test_compute_project_deserialize() {
        let json = r#"{
            "kind": "compute#project",
            "name": "my-project",
            "quotas": [
                {"metric": "SNAPSHOTS", "limit": 5000.0, "usage": 12.0},
                {"metric": "NETWORKS", "limit": 15, "usage": 1},
                {"metric": "FIREWALLS", "limit": 200}
            ]
        }"#;

        let project: ComputeProject = serde_json::from_str(json).unwrap();
        let quotas: Vec<QuotaRecord> = project.quotas.into_iter().map(QuotaRecord::from).collect();

        assert_eq!(quotas.len(), 3);
        assert_eq!(quotas[0], QuotaRecord::new("SNAPSHOTS", 5000.0, 12.0));
        assert_eq!(quotas[1], QuotaRecord::new("NETWORKS", 15.0, 1.0));
        assert_eq!(quotas[2].usage, 0.0);
    }

    #[test]
    fn test_region_list_deserialize() {
        let json = r#"{
            "items": [
                {"name": "us-central1", "quotas": [{"metric": "CPUS", "limit": 24, "usage": 4}]},
                {"name": "europe-west1"}
            ],
            "nextPageToken": ""
        }"#;

        let list: RegionList = serde_json::from_str(json).unwrap();

        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[0].name, "us-central1");
        assert_eq!(list.items[0].quotas.len(), 1);
        assert!(list.items[1].quotas.is_empty());
        assert!(non_empty(list.next_page_token).is_none());
    }

    #[test]
    fn test_invalid_project_number() {
        let json = r#"{"projects": [{"projectId": "x", "projectNumber": [1]}]}"#;
        assert!(serde_json::from_str::<ListProjectsResponse>(json).is_err());
    }
}
