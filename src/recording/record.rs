// src/recording/record.rs
//! Capture record data model
//!
//! A [`CaptureRecord`] is the canonical shape of one intercepted outbound
//! call. It is built once by the serializer and never mutated afterwards;
//! the transport serializes it as-is to the collector.

use chrono::{DateTime, Utc};
use hyper::HeaderMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Literal value written in place of a redacted header value
pub const REDACTED: &str = "[REDACTED]";

/// One captured call
#[derive(Debug, Clone, Serialize)]
pub struct CaptureRecord {
    /// Process-unique identifier (ULID)
    pub id: String,

    /// Capture instant
    pub timestamp: DateTime<Utc>,

    /// Elapsed time, truncated to whole milliseconds
    pub duration_ms: u64,

    /// Request as issued
    pub request: RequestRecord,

    /// Response, `None` when the call failed before any response existed
    pub response: Option<ResponseRecord>,

    /// Library and failure details
    pub meta: CaptureMeta,
}

/// Request half of a capture record
#[derive(Debug, Clone, Serialize)]
pub struct RequestRecord {
    pub method: String,
    pub url: String,
    pub headers: Headers,
    pub body: Option<String>,
    pub body_size: usize,
}

/// Response half of a capture record
#[derive(Debug, Clone, Serialize)]
pub struct ResponseRecord {
    pub status_code: u16,
    pub headers: Headers,
    pub body: Option<String>,
    pub body_size: usize,
}

/// Record metadata
#[derive(Debug, Clone, Serialize)]
pub struct CaptureMeta {
    /// Identifier of the adapter that produced the record
    pub library: String,

    /// Failure description when the underlying call failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ordered header list serialized as a JSON object
///
/// Insertion order is kept on the wire. Names keep their original casing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a value, joining it onto an existing entry of the same name
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, current)) => {
                current.push_str(", ");
                current.push_str(&value);
            }
            None => self.0.push((name, value)),
        }
    }

    /// Set a value, replacing an existing entry of the same name in place
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, current)) => *current = value,
            None => self.0.push((name, value)),
        }
    }

    /// Merge `other` into `self` with [`Headers::insert`] semantics
    pub fn merge(&mut self, other: Headers) {
        for (name, value) in other.0 {
            self.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert an HTTP header map, joining repeated values
    ///
    /// Values that are not visible ASCII are decoded lossily.
    pub fn from_header_map(map: &HeaderMap) -> Self {
        let mut headers = Self::new();
        for (name, value) in map {
            let value = match value.to_str() {
                Ok(text) => text.to_string(),
                Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
            };
            headers.append(name.as_str(), value);
        }
        headers
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

impl Serialize for Headers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, value) in &self.0 {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
