//! Exporter configuration
//!
//! One immutable value built at startup and shared by reference with every
//! component.

use std::time::Duration;

use crate::adapters::RetryPolicy;
use crate::error::{Error, Result};

/// Default Compute API base URL
pub const COMPUTE_BASE_URL: &str = "https://compute.googleapis.com/compute/v1/";

/// Default Cloud Resource Manager base URL
pub const RESOURCE_MANAGER_BASE_URL: &str = "https://cloudresourcemanager.googleapis.com/";

/// Default Service Usage base URL
pub const SERVICE_USAGE_BASE_URL: &str = "https://serviceusage.googleapis.com/";

/// Service a folder project must have enabled to be monitored
pub const DEFAULT_REQUIRED_SERVICE: &str = "compute.googleapis.com";

// =============================================================================
// Scrape Target
// =============================================================================

/// What to monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeTarget {
    /// A single project, used as-is
    Project(String),

    /// Every project directly under a folder that has the required service enabled
    Folder(String),
}

impl ScrapeTarget {
    /// Build from the optional flags. A folder takes precedence over a project.
    pub fn from_flags(project: Option<&str>, folder: Option<&str>) -> Result<Self> {
        fn non_empty(s: Option<&str>) -> Option<&str> {
            s.map(str::trim).filter(|s| !s.is_empty())
        }

        match (non_empty(project), non_empty(folder)) {
            (_, Some(folder)) => Ok(Self::Folder(folder.to_string())),
            (Some(project), None) => Ok(Self::Project(project.to_string())),
            (None, None) => Err(Error::Config(
                "GCP Project ID cannot be empty".to_string(),
            )),
        }
    }
}

impl std::fmt::Display for ScrapeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScrapeTarget::Project(id) => write!(f, "project {}", id),
            ScrapeTarget::Folder(id) => write!(f, "folder {}", id),
        }
    }
}

// =============================================================================
// API Endpoints
// =============================================================================

/// Base URLs of the three Google APIs, each ending with `/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoints {
    pub compute: String,
    pub resource_manager: String,
    pub service_usage: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            compute: COMPUTE_BASE_URL.to_string(),
            resource_manager: RESOURCE_MANAGER_BASE_URL.to_string(),
            service_usage: SERVICE_USAGE_BASE_URL.to_string(),
        }
    }
}

impl ApiEndpoints {
    /// Point all three APIs at one base URL (testing against a fake server).
    pub fn with_base_path(base: &str) -> Self {
        let base = if base.ends_with('/') {
            base.to_string()
        } else {
            format!("{}/", base)
        };

        Self {
            compute: base.clone(),
            resource_manager: base.clone(),
            service_usage: base,
        }
    }
}

// =============================================================================
// Exporter Configuration
// =============================================================================

/// Configuration for the whole exporter
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    /// Project or folder to monitor
    pub target: ScrapeTarget,

    /// Time between scrape cycles
    pub scrape_interval: Duration,

    /// Overall timeout of one HTTP request
    pub http_timeout: Duration,

    /// Retry/backoff applied to every outbound request
    pub retry: RetryPolicy,

    /// Google API base URLs
    pub endpoints: ApiEndpoints,

    /// Service checked during folder discovery
    pub required_service: String,

    /// Projects fetched in parallel within one cycle
    pub fetch_concurrency: usize,

    /// Prefix of every exported metric name
    pub metric_namespace: String,
}

impl ExporterConfig {
    /// Defaults for the given target.
    pub fn new(target: ScrapeTarget) -> Self {
        Self {
            target,
            scrape_interval: Duration::from_secs(30),
            http_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            endpoints: ApiEndpoints::default(),
            required_service: DEFAULT_REQUIRED_SERVICE.to_string(),
            fetch_concurrency: 4,
            metric_namespace: "gcp".to_string(),
        }
    }

    /// Reject values that would stall or spin the scheduler.
    pub fn validate(&self) -> Result<()> {
        if self.scrape_interval.is_zero() {
            return Err(Error::Config("scrape interval must be positive".into()));
        }
        if self.http_timeout.is_zero() {
            return Err(Error::Config("HTTP timeout must be positive".into()));
        }
        if self.fetch_concurrency == 0 {
            return Err(Error::Config("fetch concurrency must be at least 1".into()));
        }
        if self.retry.jitter_base > self.retry.max_backoff {
            return Err(Error::Config(format!(
                "backoff jitter {:?} exceeds max backoff {:?}",
                self.retry.jitter_base, self.retry.max_backoff
            )));
        }
        if self.required_service.trim().is_empty() {
            return Err(Error::Config("required service cannot be empty".into()));
        }
        Ok(())
    }
}

/// Parse durations such as `10s`, `500ms`, `2m`, `1h30m`. A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::Config("empty duration string".to_string()));
    }

    let mut total = Duration::ZERO;
    let mut chars = s.chars().peekable();

    while chars.peek().is_some() {
        let mut num_buf = String::new();
        while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
            num_buf.push(c);
            chars.next();
        }

        let mut unit = String::new();
        while let Some(c) = chars.peek().copied().filter(char::is_ascii_alphabetic) {
            unit.push(c);
            chars.next();
        }

        if num_buf.is_empty() {
            return Err(Error::Config(format!("invalid duration: {}", s)));
        }
        let num: u64 = num_buf
            .parse()
            .map_err(|_| Error::Config(format!("invalid number in duration: {}", s)))?;

        total += match unit.to_ascii_lowercase().as_str() {
            "ms" => Duration::from_millis(num),
            "" | "s" => Duration::from_secs(num),
            "m" => Duration::from_secs(num * 60),
            "h" => Duration::from_secs(num * 3600),
            other => {
                return Err(Error::Config(format!(
                    "unknown duration unit '{}' in {}",
                    other, s
                )))
            }
        };
    }

    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_target_from_flags() {
        assert_eq!(
            ScrapeTarget::from_flags(Some("p1"), None).unwrap(),
            ScrapeTarget::Project("p1".into())
        );
        assert_eq!(
            ScrapeTarget::from_flags(Some("p1"), Some("42")).unwrap(),
            ScrapeTarget::Folder("42".into())
        );
        assert_eq!(
            ScrapeTarget::from_flags(Some("p1"), Some("  ")).unwrap(),
            ScrapeTarget::Project("p1".into())
        );
        assert_matches!(ScrapeTarget::from_flags(None, None), Err(Error::Config(_)));
        assert_matches!(
            ScrapeTarget::from_flags(Some(""), Some("")),
            Err(Error::Config(_))
        );
    }

    #[test]
    fn test_target_flags_trimmed() {
        assert_eq!(
            ScrapeTarget::from_flags(Some("  p1 "), None).unwrap(),
            ScrapeTarget::Project("p1".into())
        );
        assert_eq!(
            ScrapeTarget::from_flags(None, Some(" 42\n")).unwrap(),
            ScrapeTarget::Folder("42".into())
        );
    }

    #[test]
    fn test_target_display() {
        assert_eq!(ScrapeTarget::Project("p".into()).to_string(), "project p");
        assert_eq!(ScrapeTarget::Folder("7".into()).to_string(), "folder 7");
    }

    #[test]
    fn test_default_endpoints() {
        let endpoints = ApiEndpoints::default();
        assert_eq!(endpoints.compute, COMPUTE_BASE_URL);
        assert_eq!(endpoints.resource_manager, RESOURCE_MANAGER_BASE_URL);
        assert_eq!(endpoints.service_usage, SERVICE_USAGE_BASE_URL);
    }

    #[test]
    fn test_base_path_override() {
        let endpoints = ApiEndpoints::with_base_path("http://127.0.0.1:8080");
        assert_eq!(endpoints.compute, "http://127.0.0.1:8080/");
        assert_eq!(endpoints.resource_manager, "http://127.0.0.1:8080/");
        assert_eq!(endpoints.service_usage, "http://127.0.0.1:8080/");

        let endpoints = ApiEndpoints::with_base_path("http://mock/");
        assert_eq!(endpoints.compute, "http://mock/");
    }

    #[test]
    fn test_config_defaults() {
        let config = ExporterConfig::new(ScrapeTarget::Project("p".into()));

        assert_eq!(config.scrape_interval, Duration::from_secs(30));
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.required_service, "compute.googleapis.com");
        assert_eq!(config.fetch_concurrency, 4);
        assert_eq!(config.metric_namespace, "gcp");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = ExporterConfig::new(ScrapeTarget::Project("p".into()));
        config.fetch_concurrency = 0;
        assert_matches!(config.validate(), Err(Error::Config(_)));

        let mut config = ExporterConfig::new(ScrapeTarget::Project("p".into()));
        config.scrape_interval = Duration::ZERO;
        assert_matches!(config.validate(), Err(Error::Config(_)));

        let mut config = ExporterConfig::new(ScrapeTarget::Project("p".into()));
        config.retry.jitter_base = Duration::from_secs(10);
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration(" 5S ").unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_duration_errors() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("1.5s").is_err());
    }
}
