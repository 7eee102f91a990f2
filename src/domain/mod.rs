// These are public API re-exports - they may not be used internally yet
#![allow(unused_imports)]

//! Domain Layer
//!
//! Value objects describing quota data and the ports through which the
//! scrape engine reaches Google Cloud.
//!
//! # Usage
//!
//! ```ignore
//! use gcp_quota_exporter::domain::{ProjectId, QuotaSource};
//!
//! async fn count_quotas<Q: QuotaSource>(source: &Q, project: &ProjectId) -> Result<usize> {
//!     Ok(source.project_quotas(project).await?.len())
//! }
//! ```

pub mod ports;

pub use ports::{
    // Port traits
    ProjectDirectory,
    QuotaSource,
    // Value objects
    FolderProject,
    ProjectId,
    ProjectPage,
    ProjectSnapshot,
    QuotaRecord,
    RegionQuotaSet,
    ServicePage,
    Snapshot,
};
