// src/recording/mod.rs
//! Capture records and their delivery
//!
//! - **Record**: the JSON document the collector receives
//! - **Serializer**: builds a record from a settled call, applying redaction
//! - **Event Queue**: unbounded hand-off between callers and the worker
//! - **Transport**: background worker with flush and shutdown
//! - **Collector**: HTTP delivery of one record
//!
//! # Architecture
//!
//! ```text
//! Adapter → serialize() → Transport::send() → Queue → Worker Thread
//!                                                         ↓
//!                                              POST /api/capture (JSON)
//! ```

pub mod collector;
pub mod event_queue;
pub mod record;
pub mod serializer;
pub mod transport;

// Re-export commonly used types
pub use collector::{Deliver, HttpCollector};
pub use event_queue::{EventQueue, QueueMessage, QueueStats};
pub use record::{CaptureMeta, CaptureRecord, Headers, RequestRecord, ResponseRecord};
pub use serializer::{serialize, CallBody, CapturedCall, CapturedResponse};
pub use transport::{CaptureSink, Transport, TransportConfig, TransportStats};
