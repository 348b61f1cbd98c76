// src/lib.rs
//! Egress Capture Library
//!
//! Passive capture of outbound HTTP and gRPC calls. Every call an
//! application makes through an instrumented client is turned into a
//! capture record and shipped, off the caller's path, to a local collector.
//!
//! # Architecture
//!
//! The library is structured into a few modules:
//!
//! - **interception**: capture policy, the shared capture hook and the
//!   adapters for blocking HTTP, async HTTP (tower) and unary gRPC (tonic)
//! - **recording**: capture records, serialization with redaction, and the
//!   background transport delivering to the collector
//! - **instrumentation**: the context wiring settings, policy, transport and
//!   adapters together
//! - **utils**: settings loading and error types
//!
//! Capture never changes what the application sees: results and errors of
//! the wrapped calls are returned untouched, and failures inside capture are
//! only logged through `tracing`.

pub mod instrumentation;
pub mod interception;
pub mod recording;
pub mod utils;

// Re-export commonly used types
pub use instrumentation::Instrumentation;
pub use interception::{Capturer, CapturePolicy};
pub use recording::{CaptureRecord, Transport, TransportConfig};
pub use utils::config::{Settings, SettingsLoader, SettingsOverrides};
pub use utils::errors::{EngineError, Result, TransportError};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
