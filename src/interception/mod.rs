// src/interception/mod.rs
//! Outbound call interception
//!
//! Adapters wrap the application's own clients and report every call the
//! [`CapturePolicy`] allows through a shared [`Capturer`]:
//!
//! - **Blocking client**: [`CapturingClient`] around any [`BlockingClient`]
//! - **Async HTTP**: [`CaptureLayer`], a tower layer for hyper-style services
//! - **gRPC**: [`GrpcCaptureLayer`] installed once on a tonic channel, or
//!   [`GrpcInterceptor`] around a single unary call
//!
//! # Architecture
//!
//! ```text
//! Application Code
//!     │
//!     ├─ blocking call → CapturingClient    ─┐
//!     ├─ async call    → CaptureService     ─┼─ Capturer → Transport → Collector
//!     └─ RPC           → GrpcCaptureService ─┘
//! ```

pub mod blocking;
#[cfg(any(feature = "http", feature = "grpc"))]
pub mod capture_body;
#[cfg(feature = "grpc")]
pub mod grpc_interceptor;
#[cfg(feature = "grpc")]
pub mod grpc_layer;
pub mod grpc_status;
pub mod hook;
#[cfg(feature = "http")]
pub mod http_interceptor;
pub mod policy;

// Re-export commonly used types
pub use blocking::{client_fn, BlockingClient, CapturingClient};
#[cfg(any(feature = "http", feature = "grpc"))]
pub use capture_body::CaptureBody;
#[cfg(feature = "grpc")]
pub use grpc_interceptor::{extract_host, GrpcInterceptor, RpcFailure, RpcPayload};
#[cfg(feature = "grpc")]
pub use grpc_layer::{GrpcCaptureLayer, GrpcCaptureService};
pub use grpc_status::{grpc_status_name, grpc_status_to_http};
pub use hook::{CallTimer, Capturer};
#[cfg(feature = "http")]
pub use http_interceptor::{CaptureLayer, CaptureService};
pub use policy::CapturePolicy;
