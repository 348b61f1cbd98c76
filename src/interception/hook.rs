// src/interception/hook.rs
//! Shared capture hook
//!
//! Every adapter drives the same two-step capability: [`Capturer::before_call`]
//! decides whether a call is captured and starts its timer, and
//! [`Capturer::after_call`] turns the settled call into a record and hands
//! it to the sink. Anything that goes wrong in between is logged here and
//! never reaches the caller.

use crate::interception::policy::CapturePolicy;
use crate::recording::serializer::{self, CapturedCall};
use crate::recording::transport::CaptureSink;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Timer for one captured call
#[derive(Debug)]
#[must_use = "a captured call must be finished with Capturer::after_call"]
pub struct CallTimer {
    started: Instant,
}

impl CallTimer {
    fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}

struct Hooks {
    policy: Arc<CapturePolicy>,
    sink: Arc<dyn CaptureSink>,
}

/// Capture hook handed to every adapter
///
/// Cheap to clone. A disabled capturer makes every adapter a pass-through.
#[derive(Clone)]
pub struct Capturer {
    hooks: Option<Arc<Hooks>>,
}

impl Capturer {
    pub fn new(policy: Arc<CapturePolicy>, sink: Arc<dyn CaptureSink>) -> Self {
        Self {
            hooks: Some(Arc::new(Hooks { policy, sink })),
        }
    }

    /// No-op capturer; nothing is ever captured
    pub fn disabled() -> Self {
        Self { hooks: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.hooks.is_some()
    }

    /// Start capturing a call to `host`, or `None` to pass it through untouched
    pub fn before_call(&self, host: &str) -> Option<CallTimer> {
        let hooks = self.hooks.as_ref()?;
        if hooks.policy.should_capture(host) {
            Some(CallTimer::start())
        } else {
            None
        }
    }

    /// Finish a captured call
    ///
    /// `build` assembles the call description; it runs after the elapsed
    /// time is taken. Panics in `build`, in serialization or in the sink are
    /// contained here.
    pub fn after_call<F>(&self, timer: CallTimer, build: F)
    where
        F: FnOnce() -> CapturedCall,
    {
        let Some(hooks) = self.hooks.as_ref() else {
            return;
        };
        let duration_s = timer.elapsed_secs();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let record = serializer::serialize(&hooks.policy, build(), duration_s);
            let id = record.id.clone();
            hooks.sink.submit(record).map(|()| id)
        }));

        match outcome {
            Ok(Ok(id)) => debug!("Captured call {}", id),
            Ok(Err(e)) => debug!("Failed to enqueue capture: {}", e),
            Err(_) => error!("Capture construction panicked; call outcome unaffected"),
        }
    }
}

impl std::fmt::Debug for Capturer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capturer")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
