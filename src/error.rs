//! Error types for the GCP Quota Exporter

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the GCP Quota Exporter
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP transport error (connect, timeout, body read)
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// A Google API answered with a non-success status
    #[error("Google API returned {status} for {url}: {body}")]
    ApiStatus {
        url: String,
        status: u16,
        body: String,
    },

    /// A Google API response body could not be decoded
    #[error("Failed to parse Google API response: {0}")]
    ResponseParse(String),

    // =========================================================================
    // Scrape Errors
    // =========================================================================
    /// Listing the projects of a folder failed part-way through paging
    #[error("Failed to enumerate projects in folder {folder}: {source}")]
    DiscoveryEnumeration {
        folder: String,
        #[source]
        source: Box<Error>,
    },

    /// Listing the enabled services of one project failed
    #[error("Service check failed for project {project}: {source}")]
    ServiceCheck {
        project: String,
        #[source]
        source: Box<Error>,
    },

    /// Fetching the project-wide quota list failed
    #[error("Failure when querying project quotas for {project}: {source}")]
    GlobalQuotaFetch {
        project: String,
        #[source]
        source: Box<Error>,
    },

    /// Fetching the region list with quotas failed
    #[error("Failure when querying region quotas for {project}: {source}")]
    RegionQuotaFetch {
        project: String,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Setup Errors
    // =========================================================================
    /// Access token or project id could not be resolved
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metric registration or encoding error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Status code carried by an API error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::ApiStatus { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            Error::DiscoveryEnumeration { source, .. }
            | Error::ServiceCheck { source, .. }
            | Error::GlobalQuotaFetch { source, .. }
            | Error::RegionQuotaFetch { source, .. } => source.status(),
            _ => None,
        }
    }
}
