// src/recording/event_queue.rs
//! Unbounded MPSC capture queue
//!
//! Producers append from any thread without blocking; only the transport
//! worker consumes. Backed by an unbounded crossbeam channel so a slow
//! collector never stalls the instrumented program.

use crate::recording::record::CaptureRecord;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Message carried by the queue
#[derive(Debug)]
pub enum QueueMessage {
    /// A record to deliver
    Capture(Box<CaptureRecord>),

    /// Stop the worker once everything before this message is handled
    Stop,
}

/// Capture queue
#[derive(Clone)]
pub struct EventQueue {
    sender: Sender<QueueMessage>,
    receiver: Receiver<QueueMessage>,

    /// Records pushed
    push_count: Arc<AtomicU64>,

    /// Records popped
    pop_count: Arc<AtomicU64>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            push_count: Arc::new(AtomicU64::new(0)),
            pop_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Push a record (non-blocking)
    pub fn push(&self, record: CaptureRecord) {
        // Both ends live in `self`, so the channel cannot be disconnected here.
        if self.sender.send(QueueMessage::Capture(Box::new(record))).is_ok() {
            self.push_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Push the stop marker
    pub fn push_stop(&self) {
        let _ = self.sender.send(QueueMessage::Stop);
    }

    /// Wait for the next message
    pub fn pop(&self) -> Option<QueueMessage> {
        let message = self.receiver.recv().ok();
        self.count_pop(&message);
        message
    }

    /// Pop without waiting
    pub fn try_pop(&self) -> Option<QueueMessage> {
        let message = match self.receiver.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        };
        self.count_pop(&message);
        message
    }

    fn count_pop(&self, message: &Option<QueueMessage>) {
        if let Some(QueueMessage::Capture(_)) = message {
            self.pop_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            push_count: self.push_count.load(Ordering::Relaxed),
            pop_count: self.pop_count.load(Ordering::Relaxed),
            current_size: self.receiver.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Total records pushed
    pub push_count: u64,

    /// Total records popped
    pub pop_count: u64,

    /// Messages currently buffered
    pub current_size: usize,
}
