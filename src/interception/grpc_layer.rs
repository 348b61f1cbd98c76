// src/interception/grpc_layer.rs
//! Channel-wide gRPC capture
//!
//! [`GrpcCaptureLayer`] is installed once around a tonic channel and captures
//! every call made through any client built on top of it:
//!
//! ```ignore
//! let channel = Endpoint::from_static("http://ledger.internal:443").connect().await?;
//! let channel = ServiceBuilder::new()
//!     .layer(instrumentation.grpc_layer("ledger.internal:443"))
//!     .service(channel);
//! let mut client = LedgerClient::new(channel);
//! ```
//!
//! Request bytes are copied as tonic streams them out, and the response body
//! is handed back frame by frame. The call is recorded once the response
//! trailers arrive, so unary and streaming calls look the same here. Message
//! payloads are recorded as opaque bytes unless the call uses the JSON codec.

use crate::interception::capture_body::{BodyOutcome, CaptureBody, Tap, TapBody};
use crate::interception::grpc_interceptor::{
    extract_host, metadata_to_headers, status_headers, strip_scheme, LIBRARY,
};
use crate::interception::grpc_status::{grpc_status_name, grpc_status_to_http, UNKNOWN};
use crate::interception::hook::Capturer;
use crate::recording::record::Headers;
use crate::recording::serializer::{CallBody, CapturedCall, CapturedResponse};
use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use hyper::body::Body;
use hyper::header::CONTENT_TYPE;
use hyper::{HeaderMap, Request, Response};
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::body::BoxBody;
use tonic::metadata::MetadataMap;
use tonic::{Code, Status};
use tower::{Layer, Service};

/// Protocol headers that are not call metadata
const RESERVED_HEADERS: [&str; 8] = [
    "te",
    "content-type",
    "grpc-encoding",
    "grpc-accept-encoding",
    "grpc-timeout",
    "grpc-status",
    "grpc-message",
    "grpc-status-details-bin",
];

const FRAME_HEADER_LEN: usize = 5;

/// Layer producing [`GrpcCaptureService`] for one channel target
#[derive(Debug, Clone)]
pub struct GrpcCaptureLayer {
    capturer: Capturer,
    target: Arc<str>,
    host: Arc<str>,
}

impl GrpcCaptureLayer {
    pub fn new(capturer: Capturer, target: impl Into<String>) -> Self {
        let target: String = target.into();
        let host = extract_host(&target).into();
        Self {
            capturer,
            target: target.into(),
            host,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Host used for the capture decision
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl<S> Layer<S> for GrpcCaptureLayer {
    type Service = GrpcCaptureService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GrpcCaptureService {
            inner,
            capturer: self.capturer.clone(),
            target: Arc::clone(&self.target),
            host: Arc::clone(&self.host),
        }
    }
}

/// Capturing gRPC channel
#[derive(Debug, Clone)]
pub struct GrpcCaptureService<S> {
    inner: S,
    capturer: Capturer,
    target: Arc<str>,
    host: Arc<str>,
}

impl<S, ResBody> Service<Request<BoxBody>> for GrpcCaptureService<S>
where
    S: Service<Request<BoxBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: fmt::Display + Send + 'static,
    ResBody: Body<Data = Bytes>,
    ResBody::Error: fmt::Display,
{
    type Response = Response<CaptureBody<ResBody>>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<BoxBody>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let Some(timer) = self.capturer.before_call(&self.host) else {
            return Box::pin(async move {
                let response = inner.call(request).await?;
                Ok(response.map(CaptureBody::passthrough))
            });
        };

        let (parts, body) = request.into_parts();
        let url = format!("grpc://{}{}", strip_scheme(&self.target), parts.uri.path());
        let request_headers = call_metadata(&parts.headers);
        let request_json = is_json(&parts.headers);
        let tap = Tap::default();
        let request = Request::from_parts(parts, BoxBody::new(TapBody::new(body, tap.clone())));

        let capturer = self.capturer.clone();

        Box::pin(async move {
            let rpc = RpcCall {
                url,
                request_headers,
                request_json,
                tap,
            };

            let response = match inner.call(request).await {
                Ok(response) => response,
                Err(error) => {
                    let message = error.to_string();
                    capturer.after_call(timer, || rpc.failed(message));
                    return Err(error);
                }
            };

            let (parts, body) = response.into_parts();
            let head = parts.headers.clone();
            let body = CaptureBody::capturing(body, capturer, timer, move |outcome| {
                rpc.finished(&head, outcome)
            });
            Ok(Response::from_parts(parts, body))
        })
    }
}

/// Request side of an in-flight call
struct RpcCall {
    url: String,
    request_headers: Headers,
    request_json: bool,
    tap: Tap,
}

impl RpcCall {
    fn captured(
        self,
        code: i32,
        metadata: Option<&HeaderMap>,
        body: CallBody,
        error: Option<String>,
    ) -> CapturedCall {
        let mut headers = status_headers(code);
        if let Some(metadata) = metadata {
            headers.merge(call_metadata(metadata));
        }

        CapturedCall {
            method: "POST".to_string(),
            url: self.url,
            request_headers: self.request_headers,
            request_body: render_frames(self.tap.snapshot(), self.request_json),
            response: Some(CapturedResponse {
                status_code: grpc_status_to_http(code),
                headers,
                body,
            }),
            library: LIBRARY.to_string(),
            error,
        }
    }

    /// The channel failed before any response head
    fn failed(self, message: String) -> CapturedCall {
        self.captured(UNKNOWN, None, CallBody::Text(message.clone()), Some(message))
    }

    fn finished(self, head: &HeaderMap, outcome: BodyOutcome) -> CapturedCall {
        // Trailers-only responses carry the status in the head.
        let metadata = outcome
            .trailers
            .as_ref()
            .or_else(|| head.contains_key("grpc-status").then_some(head));
        let status = metadata.and_then(Status::from_header_map);

        match status {
            Some(status) if status.code() == Code::Ok => {
                let body = render_frames(outcome.data, is_json(head));
                self.captured(0, metadata, body, outcome.error)
            }
            Some(status) => {
                let code = status.code() as i32;
                let error = format!("{}: {}", grpc_status_name(code), status.message());
                let body = CallBody::Text(status.message().to_string());
                self.captured(code, metadata, body, Some(error))
            }
            None => {
                let message = outcome
                    .error
                    .unwrap_or_else(|| "response ended without grpc-status".to_string());
                self.captured(UNKNOWN, None, CallBody::Text(message.clone()), Some(message))
            }
        }
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/grpc+json"))
}

/// Headers of a gRPC message head or trailer block, minus protocol headers
fn call_metadata(headers: &HeaderMap) -> Headers {
    let mut metadata = headers.clone();
    for name in RESERVED_HEADERS {
        metadata.remove(name);
    }
    metadata_to_headers(&MetadataMap::from_headers(metadata))
}

/// Body recorded for a stream of length-prefixed gRPC messages
fn render_frames(bytes: Bytes, json: bool) -> CallBody {
    if bytes.is_empty() {
        return CallBody::Absent;
    }
    let payload = message_bytes(&bytes).unwrap_or(bytes);
    if json {
        CallBody::Bytes(payload)
    } else {
        CallBody::Opaque(payload)
    }
}

/// Concatenated message bytes; `None` when the framing is cut short
fn message_bytes(mut rest: &[u8]) -> Option<Bytes> {
    let mut messages = BytesMut::new();
    while !rest.is_empty() {
        let header = rest.get(..FRAME_HEADER_LEN)?;
        let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let end = FRAME_HEADER_LEN.checked_add(len)?;
        messages.extend_from_slice(rest.get(FRAME_HEADER_LEN..end)?);
        rest = &rest[end..];
    }
    Some(messages.freeze())
}
