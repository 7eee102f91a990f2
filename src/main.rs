//! GCP Quota Exporter
//!
//! Serves Google Cloud project and regional quotas as Prometheus metrics.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      GCP Quota Exporter                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  Discovery   │───▶│   Fetcher    │───▶│   Snapshot   │◀── /metrics
//! │  │  (projects)  │    │  (quotas)    │    │    Store     │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use gcp_quota_exporter::adapters::{
    detect_project_id, ApiTransport, GcpClient, MetadataClient, RetryPolicy, TokenSource,
};
use gcp_quota_exporter::config::{parse_duration, ApiEndpoints, ExporterConfig, ScrapeTarget};
use gcp_quota_exporter::metrics::build_registry;
use gcp_quota_exporter::server::{run_server, ServerState};
use gcp_quota_exporter::{ScrapeScheduler, SnapshotStore};

// =============================================================================
// CLI Arguments
// =============================================================================

/// GCP Quota Exporter - Prometheus metrics for Google Cloud quotas
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// ID of the Google project to monitor (detected when neither project nor folder is set)
    #[arg(long = "gcp.project-id", alias = "gcp.project_id", env = "GOOGLE_PROJECT_ID")]
    project_id: Option<String>,

    /// ID of a folder whose projects are monitored (takes precedence over the project)
    #[arg(long = "gcp.folder-id", alias = "gcp.folder_id", env = "GOOGLE_FOLDER_ID")]
    folder_id: Option<String>,

    /// Max number of retries per Google API call
    #[arg(long = "gcp.max-retries", env = "GCP_EXPORTER_MAX_RETRIES", default_value = "0")]
    max_retries: u32,

    /// Timeout of one Google API request
    #[arg(
        long = "gcp.http-timeout",
        env = "GCP_EXPORTER_HTTP_TIMEOUT",
        default_value = "10s",
        value_parser = duration_arg
    )]
    http_timeout: Duration,

    /// Upper bound of the delay between retries
    #[arg(
        long = "gcp.max-backoff",
        env = "GCP_EXPORTER_MAX_BACKOFF_DURATION",
        default_value = "5s",
        value_parser = duration_arg
    )]
    max_backoff: Duration,

    /// Base of the exponential jittered backoff
    #[arg(
        long = "gcp.backoff-jitter",
        env = "GCP_EXPORTER_BACKOFF_JITTER_BASE",
        default_value = "1s",
        value_parser = duration_arg
    )]
    backoff_jitter: Duration,

    /// HTTP statuses that trigger a retry
    #[arg(
        long = "gcp.retry-statuses",
        env = "GCP_EXPORTER_RETRY_STATUSES",
        default_value = "503",
        value_delimiter = ','
    )]
    retry_statuses: Vec<u16>,

    /// OAuth access token (instance service account via the metadata server when unset)
    #[arg(
        long = "gcp.access-token",
        env = "GOOGLE_OAUTH_ACCESS_TOKEN",
        hide_env_values = true
    )]
    access_token: Option<String>,

    /// Time between scrape cycles
    #[arg(
        long = "scrape-interval",
        env = "GCP_EXPORTER_SCRAPE_INTERVAL",
        default_value = "30s",
        value_parser = duration_arg
    )]
    scrape_interval: Duration,

    /// Projects fetched in parallel within one cycle
    #[arg(
        long = "fetch-concurrency",
        env = "GCP_EXPORTER_FETCH_CONCURRENCY",
        default_value = "4"
    )]
    fetch_concurrency: usize,

    /// Address to listen on for web interface and telemetry
    #[arg(long = "web.listen-address", default_value = "0.0.0.0:9592")]
    listen_address: String,

    /// Path under which to expose metrics
    #[arg(long = "web.telemetry-path", default_value = "/metrics")]
    telemetry_path: String,

    /// Send every Google API call to this base URL instead (fake servers)
    #[arg(long = "test.base-path")]
    base_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

fn duration_arg(s: &str) -> std::result::Result<Duration, String> {
    parse_duration(s).map_err(|e| e.to_string())
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting GCP Quota Exporter {}", env!("CARGO_PKG_VERSION"));

    let metadata = MetadataClient::new(args.http_timeout)?;
    let target = resolve_target(&args, &metadata).await?;

    let mut config = ExporterConfig::new(target);
    config.scrape_interval = args.scrape_interval;
    config.http_timeout = args.http_timeout;
    config.fetch_concurrency = args.fetch_concurrency;
    config.retry = RetryPolicy::new(
        args.max_retries,
        args.retry_statuses.iter().copied(),
        args.backoff_jitter,
        args.max_backoff,
    );
    if let Some(base_path) = &args.base_path {
        config.endpoints = ApiEndpoints::with_base_path(base_path);
    }
    config.validate()?;

    info!("  Target: {}", config.target);
    info!("  Scrape interval: {:?}", config.scrape_interval);
    info!("  HTTP timeout: {:?}", config.http_timeout);
    info!("  Max retries: {}", config.retry.max_retries);
    info!("  Fetch concurrency: {}", config.fetch_concurrency);

    let tokens = match (&args.access_token, &args.base_path) {
        (Some(token), _) => TokenSource::Static(token.clone()),
        (None, Some(_)) => TokenSource::Anonymous,
        (None, None) => TokenSource::metadata(metadata),
    };

    let transport = ApiTransport::new(config.http_timeout, config.retry.clone(), Arc::new(tokens))?;
    let client = Arc::new(GcpClient::new(transport, config.endpoints.clone()));

    let store = Arc::new(SnapshotStore::new());
    let (registry, scrape_metrics) = build_registry(&config.metric_namespace, store.clone())?;

    let scheduler = Arc::new(
        ScrapeScheduler::from_config(&config, client.clone(), client, store)
            .with_metrics(scrape_metrics),
    );

    let cancel = CancellationToken::new();

    // Spawn the scrape loop
    let scheduler_handle = tokio::spawn(scheduler.run(cancel.clone()));

    // Serve metrics until the server fails or a shutdown signal arrives
    let state = Arc::new(ServerState::new(registry, args.telemetry_path.clone()));
    tokio::select! {
        result = run_server(&args.listen_address, state, cancel.clone()) => {
            if let Err(e) = result {
                error!("Metrics server error: {}", e);
                cancel.cancel();
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    cancel.cancel();
    scheduler_handle.await?;

    info!("Exporter shutdown complete");
    Ok(())
}

/// Target from the flags, falling back to the default project of the
/// ambient credentials.
async fn resolve_target(args: &Args, metadata: &MetadataClient) -> anyhow::Result<ScrapeTarget> {
    let given = |s: &Option<String>| s.as_deref().is_some_and(|s| !s.trim().is_empty());

    if given(&args.project_id) || given(&args.folder_id) {
        return Ok(ScrapeTarget::from_flags(
            args.project_id.as_deref(),
            args.folder_id.as_deref(),
        )?);
    }

    let credentials_file = std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from);
    let project_id = detect_project_id(credentials_file.as_deref(), metadata).await?;
    info!("Detected project ID {}", project_id);

    Ok(ScrapeTarget::from_flags(Some(&project_id), None)?)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "hyper_util=warn", "reqwest=info", "rustls=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
