// src/utils/mod.rs
//! Common utilities

pub mod config;
pub mod errors;

pub use config::{Settings, SettingsLoader, SettingsOverrides};
pub use errors::{EngineError, Result, TransportError};
