// src/interception/blocking.rs
//! Blocking HTTP client adapter
//!
//! Wraps any synchronous HTTP client that can be expressed as
//! [`BlockingClient`]. The wrapper has the same signature as the client it
//! wraps, so it drops in wherever the original was used.

use crate::interception::hook::Capturer;
use crate::recording::record::Headers;
use crate::recording::serializer::{CallBody, CapturedCall, CapturedResponse};
use bytes::Bytes;
use hyper::http::uri::Authority;
use hyper::{Request, Response};
use std::fmt;

/// Library identifier used when none is configured
pub const DEFAULT_LIBRARY: &str = "http-blocking";

/// A synchronous HTTP client
pub trait BlockingClient {
    type Error;

    fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>, Self::Error>;
}

/// Adapts a plain function into a [`BlockingClient`]
pub fn client_fn<F>(f: F) -> ClientFn<F> {
    ClientFn { f }
}

/// See [`client_fn`]
#[derive(Clone, Copy)]
pub struct ClientFn<F> {
    f: F,
}

impl<F, E> BlockingClient for ClientFn<F>
where
    F: Fn(Request<Bytes>) -> Result<Response<Bytes>, E>,
{
    type Error = E;

    fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>, E> {
        (self.f)(request)
    }
}

/// Capturing wrapper around a [`BlockingClient`]
#[derive(Clone)]
pub struct CapturingClient<C> {
    inner: C,
    capturer: Capturer,
    library: &'static str,
}

impl<C> CapturingClient<C> {
    pub fn new(inner: C, capturer: Capturer) -> Self {
        Self {
            inner,
            capturer,
            library: DEFAULT_LIBRARY,
        }
    }

    pub fn with_library(mut self, library: &'static str) -> Self {
        self.library = library;
        self
    }

    pub fn get_ref(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C> BlockingClient for CapturingClient<C>
where
    C: BlockingClient,
    C::Error: fmt::Display,
{
    type Error = C::Error;

    fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>, C::Error> {
        let host = request_host(&request);
        let Some(timer) = self.capturer.before_call(&host) else {
            return self.inner.execute(request);
        };

        let method = request.method().to_string();
        let url = request.uri().to_string();
        let request_headers = Headers::from_header_map(request.headers());
        let request_body = CallBody::from_bytes_or_absent(request.body().clone());

        let result = self.inner.execute(request);

        self.capturer.after_call(timer, || {
            let (response, error) = match &result {
                Ok(response) => (
                    Some(CapturedResponse {
                        status_code: response.status().as_u16(),
                        headers: Headers::from_header_map(response.headers()),
                        body: CallBody::Bytes(response.body().clone()),
                    }),
                    None,
                ),
                Err(e) => (None, Some(e.to_string())),
            };

            CapturedCall {
                method,
                url,
                request_headers,
                request_body,
                response,
                library: self.library.to_string(),
                error,
            }
        });

        result
    }
}

/// Destination host: URI host, else the `Host` header without its port
pub(crate) fn request_host<B>(request: &Request<B>) -> String {
    request
        .uri()
        .host()
        .map(str::to_string)
        .or_else(|| {
            request
                .headers()
                .get(hyper::header::HOST)
                .and_then(|h| h.to_str().ok())
                .and_then(|h| h.parse::<Authority>().ok())
                .map(|authority| authority.host().to_string())
        })
        .unwrap_or_default()
}
