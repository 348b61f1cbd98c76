// src/recording/serializer.rs
//! Capture serializer
//!
//! Turns one settled call into a [`CaptureRecord`]: redacts headers,
//! normalizes bodies to text or a placeholder, and truncates the duration
//! to whole milliseconds. Total over its inputs; nothing here can fail.

use crate::interception::policy::CapturePolicy;
use crate::recording::record::{
    CaptureMeta, CaptureRecord, Headers, RequestRecord, ResponseRecord, REDACTED,
};
use bytes::Bytes;
use chrono::Utc;
use ulid::Ulid;

/// Body as seen by an adapter
#[derive(Debug, Clone, Default)]
pub enum CallBody {
    /// No body at all
    #[default]
    Absent,

    /// Already-textual body
    Text(String),

    /// Raw bytes, rendered as text when they are valid UTF-8
    Bytes(Bytes),

    /// Bytes with no textual form, always rendered as a placeholder
    Opaque(Bytes),
}

impl CallBody {
    /// Raw bytes, with an empty payload treated as no body
    pub fn from_bytes_or_absent(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            Self::Absent
        } else {
            Self::Bytes(bytes)
        }
    }
}

/// Response half of a settled call
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status_code: u16,
    pub headers: Headers,
    pub body: CallBody,
}

/// Everything an adapter knows about a settled call
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    pub url: String,
    pub request_headers: Headers,
    pub request_body: CallBody,
    pub response: Option<CapturedResponse>,
    pub library: String,
    pub error: Option<String>,
}

/// Build a capture record
pub fn serialize(policy: &CapturePolicy, call: CapturedCall, duration_s: f64) -> CaptureRecord {
    let (body, body_size) = normalize_body(call.request_body);
    let request = RequestRecord {
        method: call.method,
        url: call.url,
        headers: redact(policy, call.request_headers),
        body,
        body_size,
    };

    let response = call.response.map(|response| {
        let (body, body_size) = normalize_body(response.body);
        ResponseRecord {
            status_code: response.status_code,
            headers: redact(policy, response.headers),
            body,
            body_size,
        }
    });

    CaptureRecord {
        id: Ulid::new().to_string(),
        timestamp: Utc::now(),
        duration_ms: duration_ms(duration_s),
        request,
        response,
        meta: CaptureMeta {
            library: call.library,
            error: call.error,
        },
    }
}

/// Whole milliseconds, truncated toward zero
///
/// Negative and non-finite inputs collapse to zero.
pub fn duration_ms(duration_s: f64) -> u64 {
    if !duration_s.is_finite() || duration_s <= 0.0 {
        return 0;
    }
    (duration_s * 1000.0).trunc() as u64
}

fn normalize_body(body: CallBody) -> (Option<String>, usize) {
    match body {
        CallBody::Absent => (None, 0),
        CallBody::Text(text) => {
            let size = text.len();
            (Some(text), size)
        }
        CallBody::Bytes(bytes) => {
            let size = bytes.len();
            match std::str::from_utf8(&bytes) {
                Ok(text) => (Some(text.to_string()), size),
                Err(_) => (Some(binary_placeholder(size)), size),
            }
        }
        CallBody::Opaque(bytes) => (Some(binary_placeholder(bytes.len())), bytes.len()),
    }
}

fn binary_placeholder(size: usize) -> String {
    format!("<binary: {} bytes>", size)
}

fn redact(policy: &CapturePolicy, headers: Headers) -> Headers {
    headers
        .iter()
        .map(|(name, value)| {
            if policy.is_redacted(name) {
                (name, REDACTED)
            } else {
                (name, value)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CapturePolicy {
        CapturePolicy::new("http://test:5110").with_redact_headers(["authorization", "x-api-key"])
    }

    fn call(request_body: CallBody, response_body: Option<CallBody>) -> CapturedCall {
        CapturedCall {
            method: "POST".to_string(),
            url: "https://api.example.com/test".to_string(),
            request_headers: Headers::new(),
            request_body,
            response: response_body.map(|body| CapturedResponse {
                status_code: 200,
                headers: Headers::new(),
                body,
            }),
            library: "hyper".to_string(),
            error: None,
        }
    }

    #[test]
    fn test_basic_fields() {
        let record = serialize(
            &policy(),
            call(CallBody::Absent, Some(CallBody::Text(r#"{"ok": true}"#.to_string()))),
            0.15,
        );

        assert_eq!(record.duration_ms, 150);
        assert_eq!(record.request.method, "POST");
        assert_eq!(record.request.url, "https://api.example.com/test");
        let response = record.response.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body.as_deref(), Some(r#"{"ok": true}"#));
        assert_eq!(record.meta.library, "hyper");
        assert!(!record.id.is_empty());
    }

    #[test]
    fn test_absent_body_is_null_with_zero_size() {
        let record = serialize(&policy(), call(CallBody::Absent, None), 0.1);
        assert_eq!(record.request.body, None);
        assert_eq!(record.request.body_size, 0);
    }

    #[test]
    fn test_binary_body_gets_placeholder() {
        let binary: Vec<u8> = (0..=255u8).collect();
        let record = serialize(&policy(), call(CallBody::Bytes(Bytes::from(binary)), None), 0.1);

        assert_eq!(record.request.body.as_deref(), Some("<binary: 256 bytes>"));
        assert_eq!(record.request.body_size, 256);
    }

    #[test]
    fn test_opaque_body_is_never_rendered_as_text() {
        // Valid UTF-8, but still not meant to be read as text.
        let record = serialize(&policy(), call(CallBody::Opaque(Bytes::from_static(b"\x0a\x02hi")), None), 0.1);

        assert_eq!(record.request.body.as_deref(), Some("<binary: 4 bytes>"));
        assert_eq!(record.request.body_size, 4);
    }

    #[test]
    fn test_utf8_bytes_pass_through() {
        let record = serialize(
            &policy(),
            call(
                CallBody::Bytes(Bytes::from_static(br#"{"key": "value"}"#)),
                Some(CallBody::Bytes(Bytes::from_static(br#"{"result": "ok"}"#))),
            ),
            0.1,
        );

        assert_eq!(record.request.body.as_deref(), Some(r#"{"key": "value"}"#));
        assert_eq!(record.request.body_size, 16);
        assert_eq!(
            record.response.unwrap().body.as_deref(),
            Some(r#"{"result": "ok"}"#)
        );
    }

    #[test]
    fn test_text_size_counts_utf8_bytes() {
        let record = serialize(&policy(), call(CallBody::Text("héllo".to_string()), None), 0.1);
        assert_eq!(record.request.body_size, 6);
    }

    #[test]
    fn test_header_redaction_preserves_other_headers() {
        let mut call = call(CallBody::Absent, None);
        call.request_headers = vec![
            ("Content-Type", "application/json"),
            ("Authorization", "Bearer sk-secret"),
            ("X-Api-Key", "key_12345"),
            ("X-Custom", "keep-this"),
        ]
        .into_iter()
        .collect();

        let record = serialize(&policy(), call, 0.1);
        let headers = &record.request.headers;
        assert_eq!(headers.get("Content-Type"), Some("application/json"));
        assert_eq!(headers.get("Authorization"), Some(REDACTED));
        assert_eq!(headers.get("X-Api-Key"), Some(REDACTED));
        assert_eq!(headers.get("X-Custom"), Some("keep-this"));
    }

    #[test]
    fn test_response_headers_are_redacted_too() {
        let mut call = call(CallBody::Absent, Some(CallBody::Absent));
        if let Some(response) = call.response.as_mut() {
            response.headers = vec![("x-api-key", "leak")].into_iter().collect();
        }

        let record = serialize(&policy(), call, 0.1);
        assert_eq!(record.response.unwrap().headers.get("x-api-key"), Some(REDACTED));
    }

    #[test]
    fn test_custom_redact_list_replaces_defaults() {
        let policy = CapturePolicy::new("http://test:5110").with_redact_headers(["x-secret"]);
        let mut call = call(CallBody::Absent, None);
        call.request_headers = vec![("Authorization", "Bearer token"), ("X-Secret", "hidden")]
            .into_iter()
            .collect();

        let record = serialize(&policy, call, 0.05);
        assert_eq!(record.request.headers.get("Authorization"), Some("Bearer token"));
        assert_eq!(record.request.headers.get("X-Secret"), Some(REDACTED));
    }

    #[test]
    fn test_duration_truncates() {
        assert_eq!(duration_ms(1.5678), 1567);
        assert_eq!(duration_ms(0.0009), 0);
        assert_eq!(duration_ms(-1.0), 0);
        assert_eq!(duration_ms(f64::NAN), 0);
    }

    #[test]
    fn test_ids_are_unique() {
        let first = serialize(&policy(), call(CallBody::Absent, None), 0.0);
        let second = serialize(&policy(), call(CallBody::Absent, None), 0.0);
        assert_ne!(first.id, second.id);
    }
}
