//! Exposition Server
//!
//! Minimal HTTP/1 server exposing the metrics registry, a landing page and
//! a liveness endpoint.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::metrics::encode_text;

/// Shared state of every connection
pub struct ServerState {
    registry: Registry,
    metrics_path: String,
}

impl ServerState {
    pub fn new(registry: Registry, metrics_path: impl Into<String>) -> Self {
        let metrics_path = metrics_path.into();
        let metrics_path = if metrics_path.starts_with('/') {
            metrics_path
        } else {
            format!("/{}", metrics_path)
        };

        Self {
            registry,
            metrics_path,
        }
    }

    pub fn metrics_path(&self) -> &str {
        &self.metrics_path
    }

    /// Build the response for one request.
    pub fn respond(&self, method: &Method, path: &str) -> Response<Full<Bytes>> {
        if method != Method::GET && method != Method::HEAD {
            return text_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        }

        if path == self.metrics_path {
            return self.metrics_response();
        }

        match path {
            "/" => self.landing_page(),
            "/healthz" => text_response(StatusCode::OK, "ok"),
            _ => text_response(StatusCode::NOT_FOUND, "not found"),
        }
    }

    fn metrics_response(&self) -> Response<Full<Bytes>> {
        match encode_text(&self.registry) {
            Ok((content_type, body)) => {
                let mut response = Response::new(Full::new(Bytes::from(body)));
                if let Ok(value) = HeaderValue::from_str(&content_type) {
                    response.headers_mut().insert(CONTENT_TYPE, value);
                }
                response
            }
            Err(e) => {
                error!(error = %e, "Failed to encode metrics");
                text_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics")
            }
        }
    }

    fn landing_page(&self) -> Response<Full<Bytes>> {
        let body = format!(
            "<html>\n\
             <head><title>GCP Quota Exporter</title></head>\n\
             <body>\n\
             <h1>GCP Quota Exporter</h1>\n\
             <p>Version {}</p>\n\
             <p><a href=\"{}\">Metrics</a></p>\n\
             </body>\n\
             </html>\n",
            env!("CARGO_PKG_VERSION"),
            self.metrics_path
        );

        let mut response = Response::new(Full::new(Bytes::from(body)));
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        response
    }
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("metrics_path", &self.metrics_path)
            .finish_non_exhaustive()
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Bind `addr` and serve until `cancel` fires.
pub async fn run_server(
    addr: &str,
    state: Arc<ServerState>,
    cancel: CancellationToken,
) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid listen address {}: {}", addr, e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind metrics server: {}", e)))?;

    info!(
        "Metrics server listening on {}{}",
        addr,
        state.metrics_path()
    );
    serve(listener, state, cancel).await
}

/// Serve connections from an already bound listener until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ServerState>,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted
                .map_err(|e| Error::Internal(format!("Metrics server accept error: {}", e)))?,
        };

        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let state = Arc::clone(&state);
                async move {
                    debug!(method = %req.method(), path = req.uri().path(), "Request");
                    Ok::<_, Infallible>(state.respond(req.method(), req.uri().path()))
                }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!(peer = %peer, "Metrics server connection error: {}", e);
            }
        });
    }

    info!("Metrics server shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{ProjectId, ProjectSnapshot, QuotaRecord, Snapshot};
    use crate::metrics::build_registry;
    use crate::snapshot::SnapshotStore;
    use http_body_util::BodyExt;

    fn state() -> ServerState {
        let store = Arc::new(SnapshotStore::new());
        store.publish(Snapshot::new(
            1,
            vec![ProjectSnapshot {
                project_id: ProjectId::new("p"),
                global: Some(vec![QuotaRecord::new("FIREWALLS", 200.0, 12.0)]),
                regions: Some(vec![]),
            }],
        ));
        let (registry, _) = build_registry("gcp", store).unwrap();
        ServerState::new(registry, "/metrics")
    }

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let response = state().respond(&Method::GET, "/metrics");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
        let body = body_text(response).await;
        assert!(body.contains(r#"gcp_quota_usage{metric="FIREWALLS",project="p",region=""} 12"#));
        assert!(body.contains(r#"gcp_quota_project_up{project="p"} 1"#));
    }

    #[tokio::test]
    async fn test_landing_page_links_metrics() {
        let state = ServerState::new(Registry::new(), "custom");
        assert_eq!(state.metrics_path(), "/custom");

        let response = state.respond(&Method::GET, "/");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("href=\"/custom\""));
    }

    #[test]
    fn test_health_and_not_found() {
        let state = state();

        assert_eq!(state.respond(&Method::GET, "/healthz").status(), StatusCode::OK);
        assert_eq!(
            state.respond(&Method::GET, "/nope").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            state.respond(&Method::POST, "/metrics").status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
    }

    #[tokio::test]
    async fn test_run_server_rejects_bad_address() {
        let result = run_server(
            "not-an-address",
            Arc::new(state()),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_serve_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(serve(listener, Arc::new(state()), cancel.clone()));

        cancel.cancel();

        assert!(handle.await.unwrap().is_ok());
    }
}
