// src/interception/grpc_interceptor.rs
//! Unary gRPC call interceptor and shared gRPC capture helpers
//!
//! Most applications install [`GrpcCaptureLayer`](super::grpc_layer::GrpcCaptureLayer)
//! once on their channel. [`GrpcInterceptor`] wraps a single unary tonic call
//! instead, rendering typed messages through [`RpcPayload`]:
//!
//! ```ignore
//! let grpc = instrumentation.grpc("dns:///payments.internal:443");
//! let reply = grpc
//!     .unary("/payments.v1.Ledger/Post", Request::new(entry), |req| client.post(req))
//!     .await?;
//! ```
//!
//! The call's result, success or [`tonic::Status`], is returned exactly as
//! the client produced it.

use crate::interception::grpc_status::{grpc_status_name, grpc_status_to_http, UNKNOWN};
use crate::interception::hook::Capturer;
use crate::recording::record::Headers;
use crate::recording::serializer::{CallBody, CapturedCall, CapturedResponse};
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use tonic::metadata::{KeyAndValueRef, MetadataMap};

/// Library identifier for gRPC captures
pub const LIBRARY: &str = "grpc";

/// Prefixes stripped from a channel target before host comparison
const TARGET_PREFIXES: [&str; 7] = [
    "dns:///", "dns://", "ipv4:", "ipv6:", "unix:", "https://", "http://",
];

/// A message that can be rendered into a capture
///
/// Implementors with a structured JSON form override [`RpcPayload::projection`];
/// everything else is rendered through `Debug`.
pub trait RpcPayload: fmt::Debug {
    fn projection(&self) -> Option<serde_json::Value> {
        None
    }
}

impl RpcPayload for () {
    fn projection(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({}))
    }
}

impl RpcPayload for serde_json::Value {
    fn projection(&self) -> Option<serde_json::Value> {
        Some(self.clone())
    }
}

impl RpcPayload for prost_types::Struct {
    fn projection(&self) -> Option<serde_json::Value> {
        Some(struct_to_json(self))
    }
}

impl RpcPayload for prost_types::Value {
    fn projection(&self) -> Option<serde_json::Value> {
        Some(value_to_json(self))
    }
}

impl RpcPayload for prost_types::ListValue {
    fn projection(&self) -> Option<serde_json::Value> {
        Some(serde_json::Value::Array(self.values.iter().map(value_to_json).collect()))
    }
}

/// A failed unary call
pub trait RpcFailure: fmt::Display {
    /// gRPC status code, `None` when the failure never produced one
    fn status_code(&self) -> Option<i32> {
        None
    }

    /// Text recorded as the response body
    fn status_message(&self) -> String {
        self.to_string()
    }

    /// Trailing metadata attached to the failure
    fn trailers(&self) -> Headers {
        Headers::new()
    }
}

impl RpcFailure for tonic::Status {
    fn status_code(&self) -> Option<i32> {
        Some(self.code() as i32)
    }

    fn status_message(&self) -> String {
        self.message().to_string()
    }

    fn trailers(&self) -> Headers {
        metadata_to_headers(self.metadata())
    }
}

impl RpcFailure for tonic::transport::Error {}

/// Interceptor for one channel target
#[derive(Debug, Clone)]
pub struct GrpcInterceptor {
    capturer: Capturer,
    target: String,
    host: String,
}

impl GrpcInterceptor {
    pub fn new(capturer: Capturer, target: impl Into<String>) -> Self {
        let target = target.into();
        let host = extract_host(&target).to_string();
        Self {
            capturer,
            target,
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

    /// Run one unary call through the interceptor
    ///
    /// `method` is the full gRPC path, e.g. `/pkg.Service/Method`.
    pub async fn unary<Req, Resp, E, F, Fut>(
        &self,
        method: &str,
        request: tonic::Request<Req>,
        call: F,
    ) -> Result<tonic::Response<Resp>, E>
    where
        Req: RpcPayload,
        Resp: RpcPayload,
        E: RpcFailure,
        F: FnOnce(tonic::Request<Req>) -> Fut,
        Fut: Future<Output = Result<tonic::Response<Resp>, E>>,
    {
        let Some(timer) = self.capturer.before_call(&self.host) else {
            return call(request).await;
        };

        let url = format!("grpc://{}{}", strip_scheme(&self.target), method);
        let request_headers = metadata_to_headers(request.metadata());
        let request_body = render_payload(request.get_ref());

        let result = call(request).await;

        self.capturer.after_call(timer, || {
            let (response, error) = match &result {
                Ok(response) => {
                    let mut headers = status_headers(0);
                    headers.merge(metadata_to_headers(response.metadata()));
                    let response = CapturedResponse {
                        status_code: grpc_status_to_http(0),
                        headers,
                        body: CallBody::Text(render_payload(response.get_ref())),
                    };
                    (response, None)
                }
                Err(failure) => {
                    let code = failure.status_code().unwrap_or(UNKNOWN);
                    let mut headers = status_headers(code);
                    headers.merge(failure.trailers());
                    let response = CapturedResponse {
                        status_code: grpc_status_to_http(code),
                        headers,
                        body: CallBody::Text(failure.status_message()),
                    };
                    (response, Some(failure.to_string()))
                }
            };

            CapturedCall {
                method: "POST".to_string(),
                url,
                request_headers,
                request_body: CallBody::Text(request_body),
                response: Some(response),
                library: LIBRARY.to_string(),
                error,
            }
        });

        result
    }
}

/// Hostname of a gRPC channel target
///
/// Strips a resolver or scheme prefix, a DNS authority and a trailing port:
/// `dns://8.8.8.8/svc.local:443` becomes `svc.local`.
pub fn extract_host(target: &str) -> &str {
    let mut rest = target;
    for prefix in TARGET_PREFIXES {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }

    if let Some((_, tail)) = rest.rsplit_once('/') {
        rest = tail;
    }
    if let Some((head, _)) = rest.rsplit_once(':') {
        rest = head;
    }
    rest
}

pub(crate) fn strip_scheme(target: &str) -> &str {
    target
        .strip_prefix("https://")
        .or_else(|| target.strip_prefix("http://"))
        .unwrap_or(target)
}

/// Render a payload; never panics
pub fn render_payload<T: RpcPayload + ?Sized>(payload: &T) -> String {
    let rendered = panic::catch_unwind(AssertUnwindSafe(|| match payload.projection() {
        Some(value) => {
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| format!("{:?}", payload))
        }
        None => format!("{:?}", payload),
    }));
    rendered.unwrap_or_else(|_| "<unrenderable payload>".to_string())
}

pub(crate) fn status_headers(code: i32) -> Headers {
    let mut headers = Headers::new();
    headers.insert("grpc-status", code.to_string());
    headers.insert("grpc-status-name", grpc_status_name(code));
    headers
}

pub(crate) fn metadata_to_headers(metadata: &MetadataMap) -> Headers {
    let mut headers = Headers::new();
    for entry in metadata.iter() {
        match entry {
            KeyAndValueRef::Ascii(key, value) => {
                let value = match value.to_str() {
                    Ok(text) => text.to_string(),
                    Err(_) => String::from_utf8_lossy(value.as_encoded_bytes()).into_owned(),
                };
                headers.insert(key.as_str(), value);
            }
            KeyAndValueRef::Binary(key, value) => {
                let size = value.to_bytes().map(|bytes| bytes.len()).unwrap_or(0);
                headers.insert(key.as_str(), format!("<binary: {} bytes>", size));
            }
        }
    }
    headers
}

fn struct_to_json(value: &prost_types::Struct) -> serde_json::Value {
    serde_json::Value::Object(
        value
            .fields
            .iter()
            .map(|(key, value)| (key.clone(), value_to_json(value)))
            .collect(),
    )
}

fn value_to_json(value: &prost_types::Value) -> serde_json::Value {
    use prost_types::value::Kind;

    match &value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::NumberValue(number)) => serde_json::Number::from_f64(*number)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Some(Kind::StringValue(text)) => serde_json::Value::String(text.clone()),
        Some(Kind::BoolValue(flag)) => serde_json::Value::Bool(*flag),
        Some(Kind::StructValue(inner)) => struct_to_json(inner),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(value_to_json).collect())
        }
    }
}
