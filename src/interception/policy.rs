// src/interception/policy.rs
//! Host-based capture policy
//!
//! Decides per destination host whether a call is captured. The policy is
//! built once at instrumentation time and shared read-only afterwards.

use hyper::Uri;
use std::collections::HashSet;
use tracing::debug;

/// Capture policy
#[derive(Debug, Clone)]
pub struct CapturePolicy {
    /// Capture every host not explicitly ignored
    capture_all: bool,

    /// Hosts captured when `capture_all` is off
    capture_hosts: HashSet<String>,

    /// Hosts never captured; always contains the collector's own host
    ignore_hosts: HashSet<String>,

    /// Lower-cased header names whose values are redacted
    redact_headers: HashSet<String>,
}

impl CapturePolicy {
    /// Create a policy that captures everything except the collector itself
    pub fn new(collector_url: &str) -> Self {
        let mut ignore_hosts = HashSet::new();
        if let Some(host) = collector_host(collector_url) {
            debug!("Ignoring collector host {}", host);
            ignore_hosts.insert(host);
        }

        Self {
            capture_all: true,
            capture_hosts: HashSet::new(),
            ignore_hosts,
            redact_headers: HashSet::new(),
        }
    }

    pub fn with_capture_all(mut self, capture_all: bool) -> Self {
        self.capture_all = capture_all;
        self
    }

    pub fn with_capture_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capture_hosts.extend(hosts.into_iter().map(Into::into));
        self
    }

    /// Add ignored hosts; the collector host seeded by [`CapturePolicy::new`] stays
    pub fn with_ignore_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_hosts.extend(hosts.into_iter().map(Into::into));
        self
    }

    /// Replace the redacted header names
    pub fn with_redact_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.redact_headers = headers
            .into_iter()
            .map(|name| name.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    /// Should a call to `host` be captured?
    pub fn should_capture(&self, host: &str) -> bool {
        if self.ignore_hosts.contains(host) {
            return false;
        }
        self.capture_all || self.capture_hosts.contains(host)
    }

    /// Is the header `name` redacted? Matching is case-insensitive.
    pub fn is_redacted(&self, name: &str) -> bool {
        !self.redact_headers.is_empty() && self.redact_headers.contains(&name.to_ascii_lowercase())
    }

    pub fn capture_all(&self) -> bool {
        self.capture_all
    }

    pub fn ignore_hosts(&self) -> &HashSet<String> {
        &self.ignore_hosts
    }

    pub fn capture_hosts(&self) -> &HashSet<String> {
        &self.capture_hosts
    }
}

/// Hostname of the collector URL, if it parses
fn collector_host(collector_url: &str) -> Option<String> {
    collector_url
        .parse::<Uri>()
        .ok()
        .and_then(|uri| uri.host().map(str::to_string))
}
