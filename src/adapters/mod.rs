//! Infrastructure Adapters
//!
//! This module contains adapter implementations for the domain ports,
//! following the Port/Adapter (Hexagonal) architecture pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │            ProjectDirectory │ QuotaSource                   │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │ GcpClient → ApiTransport → RetryPolicy + TokenSource       │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use gcp_quota_exporter::adapters::{ApiTransport, GcpClient, RetryPolicy, TokenSource};
//! use gcp_quota_exporter::domain::QuotaSource;
//!
//! let transport = ApiTransport::new(timeout, RetryPolicy::default(), tokens)?;
//! let client = GcpClient::new(transport, ApiEndpoints::default());
//!
//! // Use it through the domain port trait
//! let quotas = client.project_quotas(&project_id).await?;
//! ```

mod credentials;
mod gcp;
mod memory;
mod retry;
mod transport;

pub use credentials::{
    detect_project_id, project_id_from_credentials_json, CachedToken, MetadataClient, TokenSource,
    METADATA_BASE_URL,
};
pub use gcp::GcpClient;
pub use memory::InMemoryCloud;
pub use retry::RetryPolicy;
pub use transport::ApiTransport;
