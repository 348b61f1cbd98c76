// src/utils/errors.rs
//! Error types
//!
//! None of these ever reach the caller of an intercepted call: adapters log
//! and swallow them. They surface only from initialization and from the
//! transport's own API.

use hyper::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Crate-level result alias
pub type Result<T> = std::result::Result<T, EngineError>;

/// Initialization and configuration errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid collector URL {url:?}: {reason}")]
    InvalidCollectorUrl { url: String, reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Enqueue and delivery errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is shut down")]
    Closed,

    #[error("failed to start transport worker: {0}")]
    Worker(#[source] std::io::Error),

    #[error("failed to build delivery runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to encode capture record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to build collector request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("collector unreachable: {0}")]
    Network(String),

    #[error("collector did not answer within {0:?}")]
    Timeout(Duration),

    #[error("collector rejected capture with status {0}")]
    Rejected(StatusCode),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_converts_into_engine_error() {
        let error: EngineError = TransportError::Closed.into();
        assert_eq!(error.to_string(), "transport is shut down");
    }

    #[test]
    fn test_rejected_message_includes_status() {
        let error = TransportError::Rejected(StatusCode::SERVICE_UNAVAILABLE);
        assert!(error.to_string().contains("503"));
    }
}
