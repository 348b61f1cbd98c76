// src/recording/collector.rs
//! Collector delivery
//!
//! Posts one capture record per request to `{collector}/api/capture`.
//! Runs only on the transport worker thread; the async client is driven by a
//! current-thread runtime created lazily on first delivery.

use crate::recording::record::CaptureRecord;
use crate::utils::errors::{EngineError, TransportError};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::CONTENT_TYPE;
use hyper::{Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::debug;

/// Path the collector accepts captures on
pub const CAPTURE_PATH: &str = "/api/capture";

/// Delivers one record to its destination
///
/// Implementations run on the worker thread only and may block.
pub trait Deliver: Send + 'static {
    fn deliver(&mut self, record: &CaptureRecord) -> Result<(), TransportError>;
}

/// HTTP collector client
pub struct HttpCollector {
    endpoint: Uri,
    timeout: Duration,
    client: Client<HttpConnector, Full<Bytes>>,
    runtime: Option<Runtime>,
}

impl HttpCollector {
    /// Create a client for the collector at `collector_url`
    pub fn new(collector_url: &str, timeout: Duration) -> Result<Self, EngineError> {
        let endpoint = capture_endpoint(collector_url)?;
        let client = Client::builder(TokioExecutor::new()).build_http();

        Ok(Self {
            endpoint,
            timeout,
            client,
            runtime: None,
        })
    }

    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    fn runtime(&mut self) -> Result<&Runtime, TransportError> {
        if self.runtime.is_none() {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(TransportError::Runtime)?;
            self.runtime = Some(runtime);
        }
        // Populated just above.
        self.runtime.as_ref().ok_or(TransportError::Closed)
    }
}

impl Deliver for HttpCollector {
    fn deliver(&mut self, record: &CaptureRecord) -> Result<(), TransportError> {
        let body = serde_json::to_vec(record)?;
        let request = Request::post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(body)))?;

        let client = self.client.clone();
        let timeout = self.timeout;
        let runtime = self.runtime()?;

        runtime.block_on(async move {
            let response = tokio::time::timeout(timeout, client.request(request))
                .await
                .map_err(|_| TransportError::Timeout(timeout))?
                .map_err(|e| TransportError::Network(e.to_string()))?;

            let status = response.status();
            // Drain the acknowledgment so the connection can be reused.
            if let Err(e) = response.into_body().collect().await {
                debug!("Failed to read collector acknowledgment: {}", e);
            }

            if status.is_success() {
                Ok(())
            } else {
                Err(TransportError::Rejected(status))
            }
        })
    }
}

/// `{collector_url}/api/capture`, tolerating a trailing slash
fn capture_endpoint(collector_url: &str) -> Result<Uri, EngineError> {
    let base = collector_url.trim_end_matches('/');
    let endpoint = format!("{}{}", base, CAPTURE_PATH);

    let uri = endpoint
        .parse::<Uri>()
        .map_err(|e| EngineError::InvalidCollectorUrl {
            url: collector_url.to_string(),
            reason: e.to_string(),
        })?;

    let reason = match uri.scheme_str() {
        Some("https") => Some(
            "TLS collectors are not supported; the collector is a local sidecar reached over plain http://",
        ),
        Some("http") if uri.host().is_some() => None,
        _ => Some("expected an http:// URL with a host"),
    };
    if let Some(reason) = reason {
        return Err(EngineError::InvalidCollectorUrl {
            url: collector_url.to_string(),
            reason: reason.to_string(),
        });
    }

    Ok(uri)
}
