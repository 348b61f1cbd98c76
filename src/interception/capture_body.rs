// src/interception/capture_body.rs
//! Pass-through bodies that copy what flows through them
//!
//! [`CaptureBody`] hands every response frame to the caller as soon as the
//! inner body yields it and finishes the capture exactly once: at end of
//! stream, on the first body error, or when the body is dropped. [`TapBody`]
//! copies request data into a shared [`Tap`] without holding it back.

use crate::interception::hook::{CallTimer, Capturer};
use crate::recording::serializer::CapturedCall;
use bytes::{Bytes, BytesMut};
use hyper::body::{Body, Frame, SizeHint};
use hyper::HeaderMap;
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

/// Recorded when the caller drops a body it has not read to the end
pub const DROPPED_BEFORE_END: &str = "response body dropped before end of stream";

/// Shared copy of the data frames seen on one body
#[derive(Debug, Clone, Default)]
pub struct Tap(Arc<Mutex<BytesMut>>);

impl Tap {
    fn record(&self, data: &Bytes) {
        self.0.lock().extend_from_slice(data);
    }

    /// Everything recorded so far
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.0.lock())
    }
}

/// Body that copies its data frames into a [`Tap`]
pub struct TapBody<B> {
    inner: Pin<Box<B>>,
    tap: Tap,
}

impl<B> TapBody<B> {
    pub fn new(inner: B, tap: Tap) -> Self {
        Self {
            inner: Box::pin(inner),
            tap,
        }
    }
}

impl<B> Body for TapBody<B>
where
    B: Body<Data = Bytes>,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, B::Error>>> {
        let frame = ready!(self.inner.as_mut().poll_frame(cx));
        if let Some(data) = frame.as_ref().and_then(|f| f.as_ref().ok()).and_then(Frame::data_ref) {
            self.tap.record(data);
        }
        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

/// State of a response body when its capture finished
#[derive(Debug, Default)]
pub struct BodyOutcome {
    /// Data frames seen, in order
    pub data: Bytes,

    /// Trailers, if the body carried any
    pub trailers: Option<HeaderMap>,

    /// First body error, or [`DROPPED_BEFORE_END`]
    pub error: Option<String>,
}

type Finish = Box<dyn FnOnce(BodyOutcome) -> CapturedCall + Send + Sync>;

struct Pending {
    capturer: Capturer,
    timer: CallTimer,
    data: BytesMut,
    trailers: Option<HeaderMap>,
    finish: Finish,
}

/// Response body finishing a capture once it has been streamed
pub struct CaptureBody<B: Body> {
    inner: Pin<Box<B>>,
    pending: Option<Pending>,
}

impl<B: Body> CaptureBody<B> {
    /// Body of a call that is not captured
    pub fn passthrough(inner: B) -> Self {
        Self {
            inner: Box::pin(inner),
            pending: None,
        }
    }

    /// Body of a captured call; `finish` builds the call description
    pub fn capturing<F>(inner: B, capturer: Capturer, timer: CallTimer, finish: F) -> Self
    where
        F: FnOnce(BodyOutcome) -> CapturedCall + Send + Sync + 'static,
    {
        Self {
            inner: Box::pin(inner),
            pending: Some(Pending {
                capturer,
                timer,
                data: BytesMut::new(),
                trailers: None,
                finish: Box::new(finish),
            }),
        }
    }

    /// Is a capture still waiting on this body?
    pub fn is_capturing(&self) -> bool {
        self.pending.is_some()
    }

    fn complete(&mut self, error: Option<String>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let outcome = BodyOutcome {
            data: pending.data.freeze(),
            trailers: pending.trailers,
            error,
        };
        let finish = pending.finish;
        pending.capturer.after_call(pending.timer, move || finish(outcome));
    }
}

impl<B> Body for CaptureBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: fmt::Display,
{
    type Data = Bytes;
    type Error = B::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, B::Error>>> {
        let this = &mut *self;
        let frame = ready!(this.inner.as_mut().poll_frame(cx));

        match &frame {
            Some(Ok(frame)) => {
                let mut ended = this.inner.is_end_stream();
                if let Some(pending) = this.pending.as_mut() {
                    if let Some(data) = frame.data_ref() {
                        pending.data.extend_from_slice(data);
                    } else if let Some(trailers) = frame.trailers_ref() {
                        // Trailers are always the last frame.
                        pending.trailers = Some(trailers.clone());
                        ended = true;
                    }
                }
                if ended {
                    this.complete(None);
                }
            }
            Some(Err(e)) => this.complete(Some(e.to_string())),
            None => this.complete(None),
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B: Body> Drop for CaptureBody<B> {
    fn drop(&mut self) {
        if self.pending.is_some() {
            let error = (!self.inner.is_end_stream()).then(|| DROPPED_BEFORE_END.to_string());
            self.complete(error);
        }
    }
}

impl<B: Body> fmt::Debug for CaptureBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureBody")
            .field("capturing", &self.is_capturing())
            .finish_non_exhaustive()
    }
}
