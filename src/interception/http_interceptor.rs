// src/interception/http_interceptor.rs
//! Async HTTP client middleware
//!
//! [`CaptureLayer`] wraps any tower HTTP service, including the hyper-util
//! legacy client, and captures every call the policy allows. Skipped calls
//! go straight to the inner service. Captured calls have their request body
//! buffered; the response comes back as soon as its head arrives, and its
//! body streams through a [`CaptureBody`] that records the call once the
//! caller has read it, hit a body error, or dropped it.

use crate::interception::blocking::request_host;
use crate::interception::capture_body::{BodyOutcome, CaptureBody};
use crate::interception::hook::Capturer;
use crate::recording::record::Headers;
use crate::recording::serializer::{CallBody, CapturedCall, CapturedResponse};
use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::{Request, Response};
use std::fmt;
use std::task::{Context, Poll};
use tower::{BoxError, Layer, Service};

/// Library identifier used when none is configured
pub const DEFAULT_LIBRARY: &str = "hyper";

/// Layer producing [`CaptureService`]
#[derive(Debug, Clone)]
pub struct CaptureLayer {
    capturer: Capturer,
    library: &'static str,
}

impl CaptureLayer {
    pub fn new(capturer: Capturer) -> Self {
        Self {
            capturer,
            library: DEFAULT_LIBRARY,
        }
    }

    pub fn with_library(mut self, library: &'static str) -> Self {
        self.library = library;
        self
    }
}

impl<S> Layer<S> for CaptureLayer {
    type Service = CaptureService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CaptureService {
            inner,
            capturer: self.capturer.clone(),
            library: self.library,
        }
    }
}

/// Capturing HTTP service
#[derive(Debug, Clone)]
pub struct CaptureService<S> {
    inner: S,
    capturer: Capturer,
    library: &'static str,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for CaptureService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
    ReqBody: Body<Data = Bytes> + From<Bytes> + Send + 'static,
    ReqBody::Error: Into<BoxError>,
    ResBody: Body<Data = Bytes>,
    ResBody::Error: fmt::Display,
{
    type Response = Response<CaptureBody<ResBody>>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        // The clone is not ready; keep the one that is.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let host = request_host(&request);
        let Some(timer) = self.capturer.before_call(&host) else {
            return Box::pin(async move {
                let response = inner.call(request).await.map_err(Into::into)?;
                Ok(response.map(CaptureBody::passthrough))
            });
        };

        let capturer = self.capturer.clone();
        let library = self.library;

        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let request_bytes = body.collect().await.map_err(Into::into)?.to_bytes();

            let method = parts.method.to_string();
            let url = parts.uri.to_string();
            let request_headers = Headers::from_header_map(&parts.headers);
            let request_body = CallBody::from_bytes_or_absent(request_bytes.clone());
            let request = Request::from_parts(parts, ReqBody::from(request_bytes));

            let call = move |response: Option<CapturedResponse>, error: Option<String>| CapturedCall {
                method,
                url,
                request_headers,
                request_body,
                response,
                library: library.to_string(),
                error,
            };

            let response = match inner.call(request).await {
                Ok(response) => response,
                Err(e) => {
                    let error: BoxError = e.into();
                    capturer.after_call(timer, || call(None, Some(error.to_string())));
                    return Err(error);
                }
            };

            let (parts, body) = response.into_parts();
            let status_code = parts.status.as_u16();
            let mut headers = Headers::from_header_map(&parts.headers);

            let body = CaptureBody::capturing(body, capturer, timer, move |outcome: BodyOutcome| {
                if let Some(trailers) = &outcome.trailers {
                    headers.merge(Headers::from_header_map(trailers));
                }
                call(
                    Some(CapturedResponse {
                        status_code,
                        headers,
                        body: CallBody::Bytes(outcome.data),
                    }),
                    outcome.error,
                )
            });
            Ok(Response::from_parts(parts, body))
        })
    }
}
