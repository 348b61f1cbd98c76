// src/instrumentation.rs
//! Instrumentation context
//!
//! Owns the capture policy and the transport, and hands out adapters that
//! share them. Build it once at startup:
//!
//! ```no_run
//! use egress_capture::{Instrumentation, Settings};
//!
//! # fn main() -> egress_capture::Result<()> {
//! let settings = Settings::from_env()?;
//! if let Some(capture) = Instrumentation::init(&settings)? {
//!     // wrap clients with capture.http_layer(), capture.blocking(..), capture.grpc_layer(..)
//!     capture.shutdown_default();
//! }
//! # Ok(())
//! # }
//! ```

use crate::interception::blocking::CapturingClient;
#[cfg(feature = "grpc")]
use crate::interception::grpc_interceptor::GrpcInterceptor;
#[cfg(feature = "grpc")]
use crate::interception::grpc_layer::GrpcCaptureLayer;
use crate::interception::hook::Capturer;
#[cfg(feature = "http")]
use crate::interception::http_interceptor::CaptureLayer;
use crate::interception::policy::CapturePolicy;
use crate::recording::transport::{Transport, TransportConfig, TransportStats};
use crate::utils::config::{Settings, DEFAULT_TIMEOUT};
use crate::utils::errors::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Live capture context
pub struct Instrumentation {
    policy: Arc<CapturePolicy>,
    transport: Arc<Transport>,
    capturer: Capturer,
}

impl Instrumentation {
    /// Build from resolved settings
    ///
    /// Returns `Ok(None)` when capture is disabled. An unusable collector URL
    /// is an error.
    pub fn init(settings: &Settings) -> Result<Option<Self>> {
        if !settings.enabled {
            warn!("Outbound call capture is disabled; nothing will be captured");
            return Ok(None);
        }
        let url = settings.server_url.as_str();

        let policy = CapturePolicy::new(url)
            .with_capture_all(settings.capture_all)
            .with_capture_hosts(settings.capture_hosts.iter().cloned())
            .with_ignore_hosts(settings.ignore_hosts.iter().cloned())
            .with_redact_headers(&settings.redact_headers);
        let transport = Transport::new(TransportConfig::new(url))?;

        info!(
            "Outbound call capture started (capture_all={}, collector={})",
            settings.capture_all, url
        );
        Ok(Some(Self::with_transport(policy, Arc::new(transport))))
    }

    /// Build around an existing transport
    pub fn with_transport(policy: CapturePolicy, transport: Arc<Transport>) -> Self {
        let policy = Arc::new(policy);
        let capturer = Capturer::new(Arc::clone(&policy), transport.clone());
        Self {
            policy,
            transport,
            capturer,
        }
    }

    pub fn policy(&self) -> &CapturePolicy {
        &self.policy
    }

    /// Hook shared by every adapter handed out here
    pub fn capturer(&self) -> Capturer {
        self.capturer.clone()
    }

    /// Tower layer for async HTTP clients
    #[cfg(feature = "http")]
    pub fn http_layer(&self) -> CaptureLayer {
        CaptureLayer::new(self.capturer())
    }

    /// Wrap a blocking HTTP client
    pub fn blocking<C>(&self, inner: C) -> CapturingClient<C> {
        CapturingClient::new(inner, self.capturer())
    }

    /// Tower layer installed once on a tonic channel to `target`
    #[cfg(feature = "grpc")]
    pub fn grpc_layer(&self, target: impl Into<String>) -> GrpcCaptureLayer {
        GrpcCaptureLayer::new(self.capturer(), target)
    }

    /// Interceptor for single unary calls on one gRPC channel target
    #[cfg(feature = "grpc")]
    pub fn grpc(&self, target: impl Into<String>) -> GrpcInterceptor {
        GrpcInterceptor::new(self.capturer(), target)
    }

    pub fn flush(&self, timeout: Duration) -> bool {
        self.transport.flush(timeout)
    }

    pub fn shutdown(&self, timeout: Duration) -> bool {
        self.transport.shutdown(timeout)
    }

    /// Shutdown bounded by the default two seconds
    pub fn shutdown_default(&self) -> bool {
        self.shutdown(DEFAULT_TIMEOUT)
    }

    pub fn stats(&self) -> TransportStats {
        self.transport.stats()
    }
}

impl std::fmt::Debug for Instrumentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instrumentation")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
