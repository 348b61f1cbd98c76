// src/recording/transport.rs
//! Capture transport
//!
//! Owns the capture queue and the single background worker that delivers
//! records to the collector. Producers only ever enqueue; the worker is the
//! only consumer.
//!
//! # Lifecycle
//!
//! ```text
//! send() ──► EventQueue ──► worker thread ──► Deliver (HTTP POST)
//!   │                           │
//!   └── pending += 1            └── pending -= 1, notify flush waiters
//! ```
//!
//! The worker is spawned on the first `send`. `shutdown` marks the transport
//! closed, waits for the queue to drain (bounded by a timeout) and then asks
//! the worker to stop.

use crate::recording::collector::{Deliver, HttpCollector};
use crate::recording::event_queue::{EventQueue, QueueMessage, QueueStats};
use crate::recording::record::CaptureRecord;
use crate::utils::errors::{EngineError, TransportError};
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Timeout used when the transport is dropped without an explicit shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Collector base URL
    pub collector_url: String,

    /// Upper bound for one delivery request
    pub delivery_timeout: Duration,
}

impl TransportConfig {
    pub fn new(collector_url: impl Into<String>) -> Self {
        Self {
            collector_url: collector_url.into(),
            delivery_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }
}

/// Destination for finished capture records
///
/// Implemented by [`Transport`]; adapters only see this trait.
pub trait CaptureSink: Send + Sync {
    fn submit(&self, record: CaptureRecord) -> Result<(), TransportError>;
}

/// Producer-side bookkeeping shared with the worker
struct DrainState {
    /// Records accepted but not yet fully handled by the worker
    pending: usize,

    /// Set by `shutdown`; later sends are rejected
    closed: bool,
}

struct Shared {
    state: Mutex<DrainState>,
    drained: Condvar,
    delivered: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

impl Shared {
    fn complete_one(&self) {
        let mut state = self.state.lock();
        state.pending = state.pending.saturating_sub(1);
        if state.pending == 0 {
            self.drained.notify_all();
        }
    }
}

/// Worker bookkeeping
struct WorkerSlot {
    /// Taken when the worker starts
    deliverer: Option<Box<dyn Deliver>>,

    handle: Option<JoinHandle<()>>,
}

/// Background capture transport
pub struct Transport {
    queue: EventQueue,
    shared: Arc<Shared>,
    worker: Mutex<WorkerSlot>,
}

impl Transport {
    /// Create a transport delivering to the HTTP collector in `config`
    pub fn new(config: TransportConfig) -> Result<Self, EngineError> {
        let collector = HttpCollector::new(&config.collector_url, config.delivery_timeout)?;
        info!("Capture transport targeting {}", collector.endpoint());
        Ok(Self::with_deliverer(collector))
    }

    /// Create a transport around any deliverer
    pub fn with_deliverer(deliverer: impl Deliver) -> Self {
        Self {
            queue: EventQueue::new(),
            shared: Arc::new(Shared {
                state: Mutex::new(DrainState {
                    pending: 0,
                    closed: false,
                }),
                drained: Condvar::new(),
                delivered: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                discarded: AtomicU64::new(0),
            }),
            worker: Mutex::new(WorkerSlot {
                deliverer: Some(Box::new(deliverer)),
                handle: None,
            }),
        }
    }

    /// Enqueue a record without blocking
    pub fn send(&self, record: CaptureRecord) -> Result<(), TransportError> {
        self.ensure_worker()?;

        let mut state = self.shared.state.lock();
        if state.closed {
            metrics::counter!("egress_capture_records_rejected_total").increment(1);
            return Err(TransportError::Closed);
        }
        state.pending += 1;
        // Pushed under the lock so nothing can land behind the stop marker.
        self.queue.push(record);
        Ok(())
    }

    /// Wait until every accepted record has been handled
    ///
    /// Returns `false` if `timeout` elapses first. An in-flight delivery is
    /// never cancelled; the caller just stops waiting for it.
    pub fn flush(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.pending > 0 {
            if self
                .shared
                .drained
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.pending == 0;
            }
        }
        true
    }

    /// Flush, then stop the worker
    ///
    /// Idempotent. When the queue does not drain in time the worker is left
    /// to finish in the background and `false` is returned.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let first = {
            let mut state = self.shared.state.lock();
            !std::mem::replace(&mut state.closed, true)
        };

        let drained = self.flush(timeout);
        if !first {
            return drained;
        }

        let handle = self.worker.lock().handle.take();
        let Some(handle) = handle else {
            debug!("Capture transport shut down before the worker started");
            return drained;
        };

        self.queue.push_stop();
        if drained {
            if handle.join().is_err() {
                error!("Capture transport worker panicked");
            }
            info!("Capture transport stopped");
        } else {
            warn!(
                "Capture transport did not drain within {:?}; {} record(s) still pending",
                timeout,
                self.shared.state.lock().pending
            );
        }
        drained
    }

    pub fn stats(&self) -> TransportStats {
        TransportStats {
            queue: self.queue.stats(),
            pending: self.shared.state.lock().pending,
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            discarded: self.shared.discarded.load(Ordering::Relaxed),
        }
    }

    fn ensure_worker(&self) -> Result<(), TransportError> {
        let mut slot = self.worker.lock();
        if slot.deliverer.is_none() {
            return Ok(());
        }
        // Never start a worker that no shutdown will ever stop.
        if self.shared.state.lock().closed {
            metrics::counter!("egress_capture_records_rejected_total").increment(1);
            return Err(TransportError::Closed);
        }
        let Some(deliverer) = slot.deliverer.take() else {
            return Ok(());
        };

        let queue = self.queue.clone();
        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("egress-capture-transport".to_string())
            .spawn(move || run_worker(queue, deliverer, shared));

        match spawned {
            Ok(handle) => {
                debug!("Capture transport worker started");
                slot.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start capture transport worker: {}", e);
                self.shared.state.lock().closed = true;
                Err(TransportError::Worker(e))
            }
        }
    }
}

impl CaptureSink for Transport {
    fn submit(&self, record: CaptureRecord) -> Result<(), TransportError> {
        self.send(record)
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
    }
}

fn run_worker(queue: EventQueue, mut deliverer: Box<dyn Deliver>, shared: Arc<Shared>) {
    while let Some(message) = queue.pop() {
        let record = match message {
            QueueMessage::Capture(record) => record,
            QueueMessage::Stop => break,
        };

        match deliverer.deliver(&record) {
            Ok(()) => {
                shared.delivered.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("egress_capture_records_delivered_total").increment(1);
            }
            Err(e) => {
                // Dropped, never retried.
                warn!("Failed to deliver capture {}: {}", record.id, e);
                shared.failed.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("egress_capture_records_failed_total").increment(1);
            }
        }
        shared.complete_one();
    }

    while let Some(message) = queue.try_pop() {
        if let QueueMessage::Capture(record) = message {
            debug!("Discarding capture {} after stop", record.id);
            shared.discarded.fetch_add(1, Ordering::Relaxed);
            shared.complete_one();
        }
    }
}

/// Transport statistics
#[derive(Debug, Clone, Copy)]
pub struct TransportStats {
    pub queue: QueueStats,

    /// Accepted but not yet handled
    pub pending: usize,

    /// Acknowledged by the collector
    pub delivered: u64,

    /// Network errors and non-2xx answers
    pub failed: u64,

    /// Left in the queue when the worker stopped
    pub discarded: u64,
}
