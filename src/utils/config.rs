// src/utils/config.rs
//! Capture settings
//!
//! Each field resolves as explicit override > `EGRESS_CAPTURE_*` environment
//! variable > optional settings file > default. Raw values are normalized the
//! same way whatever layer they come from: strings are trimmed and an empty
//! string counts as unset.

use crate::utils::errors::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment prefix for every setting
pub const ENV_PREFIX: &str = "EGRESS_CAPTURE";

/// Header names redacted when nothing else is configured
pub const DEFAULT_REDACT_HEADERS: [&str; 2] = ["authorization", "x-api-key"];

/// Collector used when no URL is configured anywhere
pub const DEFAULT_SERVER_URL: &str = "http://localhost:5110";

/// Default bound for `flush` and `shutdown`
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Resolved capture settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub enabled: bool,

    /// Collector base URL without a trailing `/`
    pub server_url: String,

    pub capture_all: bool,
    pub capture_hosts: Vec<String>,
    pub ignore_hosts: Vec<String>,
    pub redact_headers: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            server_url: DEFAULT_SERVER_URL.to_string(),
            capture_all: true,
            capture_hosts: Vec::new(),
            ignore_hosts: Vec::new(),
            redact_headers: DEFAULT_REDACT_HEADERS.iter().map(|h| h.to_string()).collect(),
        }
    }
}

impl Settings {
    /// Load from the environment with no file and no overrides
    pub fn from_env() -> Result<Self> {
        SettingsLoader::new().load()
    }
}

/// Values given explicitly by the application
///
/// `None` leaves the field to the environment or the default.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub enabled: Option<bool>,
    pub server_url: Option<String>,
    pub capture_all: Option<bool>,
    pub capture_hosts: Option<Vec<String>>,
    pub ignore_hosts: Option<Vec<String>>,
    pub redact_headers: Option<Vec<String>>,
}

/// A scalar that may arrive as text (environment) or typed (file)
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Text(String),
}

/// A list that may arrive as comma separated text or as a sequence
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawList {
    Items(Vec<String>),
    Text(String),
}

#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    enabled: Option<RawFlag>,
    url: Option<String>,
    capture_all: Option<RawFlag>,
    capture_hosts: Option<RawList>,
    ignore_hosts: Option<RawList>,
    redact_headers: Option<RawList>,
}

/// Builds [`Settings`] from layered sources
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    env_prefix: String,
    file: Option<PathBuf>,
    overrides: SettingsOverrides,
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self {
            env_prefix: ENV_PREFIX.to_string(),
            file: None,
            overrides: SettingsOverrides::default(),
        }
    }

    /// Read variables named `{prefix}_*` instead of `EGRESS_CAPTURE_*`
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Add a settings file; its format follows the extension. A missing
    /// file is not an error.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn with_overrides(mut self, overrides: SettingsOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn load(self) -> Result<Settings> {
        let mut builder = config::Config::builder();
        if let Some(path) = &self.file {
            builder = builder.add_source(config::File::from(path.as_path()).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix).ignore_empty(true),
        );

        let raw: RawSettings = builder.build()?.try_deserialize()?;
        let defaults = Settings::default();
        let overrides = self.overrides;

        Ok(Settings {
            enabled: overrides
                .enabled
                .or_else(|| raw.enabled.and_then(parse_flag))
                .unwrap_or(defaults.enabled),
            server_url: overrides
                .server_url
                .and_then(|url| parse_text(&url))
                .or_else(|| raw.url.as_deref().and_then(parse_text))
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.server_url),
            capture_all: overrides
                .capture_all
                .or_else(|| raw.capture_all.and_then(parse_flag))
                .unwrap_or(defaults.capture_all),
            capture_hosts: overrides
                .capture_hosts
                .or_else(|| raw.capture_hosts.and_then(parse_list))
                .unwrap_or(defaults.capture_hosts),
            ignore_hosts: overrides
                .ignore_hosts
                .or_else(|| raw.ignore_hosts.and_then(parse_list))
                .unwrap_or(defaults.ignore_hosts),
            redact_headers: overrides
                .redact_headers
                .or_else(|| raw.redact_headers.and_then(parse_list))
                .unwrap_or(defaults.redact_headers),
        })
    }
}

/// Trimmed text, `None` when empty
fn parse_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_flag(value: RawFlag) -> Option<bool> {
    match value {
        RawFlag::Bool(flag) => Some(flag),
        RawFlag::Text(text) => parse_bool(&text),
    }
}

/// Comma separated items, trimmed, empties dropped; `None` when nothing is left
fn parse_list(value: RawList) -> Option<Vec<String>> {
    let items: Vec<String> = match value {
        RawList::Items(items) => items.iter().filter_map(|item| parse_text(item)).collect(),
        RawList::Text(text) => text.split(',').filter_map(parse_text).collect(),
    };
    (!items.is_empty()).then_some(items)
}
