//! API Transport
//!
//! Authenticated JSON GETs with a bounded request timeout and the
//! injected [`RetryPolicy`] wrapped around every call.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use super::credentials::TokenSource;
use super::retry::RetryPolicy;
use crate::error::{Error, Result};

/// Longest error body kept in `Error::ApiStatus`
const MAX_ERROR_BODY: usize = 512;

/// HTTP transport shared by all Google API adapters
#[derive(Debug, Clone)]
pub struct ApiTransport {
    client: Client,
    retry: RetryPolicy,
    tokens: Arc<TokenSource>,
}

impl ApiTransport {
    /// Create a transport with the given request timeout and retry policy.
    pub fn new(timeout: Duration, retry: RetryPolicy, tokens: Arc<TokenSource>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gcp-quota-exporter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry,
            tokens,
        })
    }

    /// The retry policy in effect.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// GET `url` with `query` and decode the JSON body.
    #[instrument(skip(self, query))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let token = self.tokens.bearer().await?;

        let response = self
            .retry
            .execute(
                || {
                    let mut request = self.client.get(url).query(query);
                    if let Some(token) = &token {
                        request = request.bearer_auth(token);
                    }
                    request.send()
                },
                |outcome: &reqwest::Result<Response>| {
                    outcome.as_ref().ok().map(|r| r.status().as_u16())
                },
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(Error::ApiStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        debug!(%status, "Google API request succeeded");

        response
            .json::<T>()
            .await
            .map_err(|e| Error::ResponseParse(format!("{}: {}", url, e)))
    }
}
