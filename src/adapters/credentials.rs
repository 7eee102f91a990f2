//! Credentials
//!
//! Access tokens for the Google APIs and detection of the default project
//! id, either from a service-account credentials file or from the GCE
//! metadata server.

use std::path::Path;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::{Error, Result};

/// Default GCE metadata server base URL
pub const METADATA_BASE_URL: &str = "http://metadata.google.internal/computeMetadata/v1/";

/// Tokens are refreshed this long before they expire
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

// =============================================================================
// Metadata Server Client
// =============================================================================

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Minimal client for the GCE metadata server
#[derive(Debug, Clone)]
pub struct MetadataClient {
    client: Client,
    base_url: String,
}

impl MetadataClient {
    /// Client for the real metadata server.
    pub fn new(timeout: Duration) -> Result<Self> {
        Self::with_base_url(METADATA_BASE_URL, timeout)
    }

    /// Client for a metadata server at a custom URL.
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        Ok(Self { client, base_url })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| Error::Credentials(format!("metadata server unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Credentials(format!(
                "metadata server returned {} for {}",
                response.status(),
                path
            )));
        }

        Ok(response)
    }

    /// Project id of the instance the exporter runs on.
    #[instrument(skip(self))]
    pub async fn project_id(&self) -> Result<String> {
        let body = self
            .get("project/project-id")
            .await?
            .text()
            .await
            .map_err(|e| Error::Credentials(format!("failed to read project id: {}", e)))?;

        let project_id = body.trim().to_string();
        if project_id.is_empty() {
            return Err(Error::Credentials(
                "metadata server returned an empty project id".into(),
            ));
        }
        Ok(project_id)
    }

    /// Fresh access token of the default service account with its lifetime.
    #[instrument(skip(self))]
    async fn access_token(&self) -> Result<(String, Duration)> {
        let token: MetadataToken = self
            .get("instance/service-accounts/default/token")
            .await?
            .json()
            .await
            .map_err(|e| Error::Credentials(format!("invalid token response: {}", e)))?;

        Ok((token.access_token, Duration::from_secs(token.expires_in)))
    }
}

// =============================================================================
// Token Source
// =============================================================================

/// A token and the instant after which it is refetched
#[derive(Debug, Clone)]
pub struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Where bearer tokens for outbound calls come from
#[derive(Debug)]
pub enum TokenSource {
    /// Send requests unauthenticated (fake API servers)
    Anonymous,

    /// A fixed token supplied by the operator
    Static(String),

    /// Tokens of the instance service account, cached until near expiry
    Metadata {
        client: MetadataClient,
        cached: RwLock<Option<CachedToken>>,
    },
}

impl TokenSource {
    /// Token source backed by the given metadata client.
    pub fn metadata(client: MetadataClient) -> Self {
        Self::Metadata {
            client,
            cached: RwLock::new(None),
        }
    }

    /// Bearer token to attach, if any.
    pub async fn bearer(&self) -> Result<Option<String>> {
        match self {
            TokenSource::Anonymous => Ok(None),
            TokenSource::Static(token) => Ok(Some(token.clone())),
            TokenSource::Metadata { client, cached } => {
                let fresh = cached
                    .read()
                    .as_ref()
                    .filter(|entry| Instant::now() < entry.refresh_at)
                    .map(|entry| entry.token.clone());
                if fresh.is_some() {
                    return Ok(fresh);
                }

                let (token, lifetime) = client.access_token().await?;
                debug!(lifetime_secs = lifetime.as_secs(), "Fetched metadata access token");

                *cached.write() = Some(CachedToken {
                    token: token.clone(),
                    refresh_at: Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN),
                });

                Ok(Some(token))
            }
        }
    }
}

// =============================================================================
// Project Id Detection
// =============================================================================

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    project_id: Option<String>,
}

/// Extract `project_id` from the contents of a credentials JSON file.
pub fn project_id_from_credentials_json(contents: &str) -> Result<String> {
    let file: CredentialsFile = serde_json::from_str(contents)
        .map_err(|e| Error::Credentials(format!("invalid credentials file: {}", e)))?;

    file.project_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::Credentials("credentials file has no project_id".into()))
}

/// Resolve the default project id: the credentials file when one is named,
/// otherwise the metadata server.
pub async fn detect_project_id(
    credentials_file: Option<&Path>,
    metadata: &MetadataClient,
) -> Result<String> {
    match credentials_file {
        Some(path) => {
            let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
                Error::Credentials(format!("Unable to read {}: {}", path.display(), e))
            })?;
            project_id_from_credentials_json(&contents).map_err(|e| {
                Error::Credentials(format!(
                    "Could not retrieve Project ID from {}: {}",
                    path.display(),
                    e
                ))
            })
        }
        None => metadata.project_id().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_project_id_from_credentials_json() {
        let json = r#"{
            "type": "service_account",
            "project_id": "my-project",
            "client_email": "exporter@my-project.iam.gserviceaccount.com"
        }"#;

        assert_eq!(project_id_from_credentials_json(json).unwrap(), "my-project");
    }

    #[test]
    fn test_project_id_missing_or_empty() {
        assert_matches!(
            project_id_from_credentials_json(r#"{"type": "service_account"}"#),
            Err(Error::Credentials(_))
        );
        assert_matches!(
            project_id_from_credentials_json(r#"{"project_id": "  "}"#),
            Err(Error::Credentials(_))
        );
        assert_matches!(
            project_id_from_credentials_json("not json"),
            Err(Error::Credentials(_))
        );
    }

    #[tokio::test]
    async fn test_detect_project_id_from_file() {
        let path = std::env::temp_dir().join(format!(
            "gcp-quota-exporter-creds-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, r#"{"project_id": "file-project"}"#).unwrap();

        let metadata =
            MetadataClient::with_base_url("http://127.0.0.1:1", Duration::from_millis(100))
                .unwrap();
        let project = detect_project_id(Some(&path), &metadata).await;
        std::fs::remove_file(&path).unwrap();

        assert_eq!(project.unwrap(), "file-project");
    }

    #[tokio::test]
    async fn test_detect_project_id_missing_file() {
        let metadata =
            MetadataClient::with_base_url("http://127.0.0.1:1", Duration::from_millis(100))
                .unwrap();
        let result = detect_project_id(
            Some(Path::new("/nonexistent/gcp-quota-exporter.json")),
            &metadata,
        )
        .await;

        assert_matches!(result, Err(Error::Credentials(_)));
    }

    #[tokio::test]
    async fn test_metadata_unreachable() {
        let metadata =
            MetadataClient::with_base_url("http://127.0.0.1:1", Duration::from_millis(200))
                .unwrap();
        assert_matches!(metadata.project_id().await, Err(Error::Credentials(_)));
    }

    #[tokio::test]
    async fn test_static_and_anonymous_tokens() {
        assert_eq!(TokenSource::Anonymous.bearer().await.unwrap(), None);
        assert_eq!(
            TokenSource::Static("abc".into()).bearer().await.unwrap(),
            Some("abc".to_string())
        );
    }
}
