//! Configuration for GRBL Link sessions
//!
//! Connection, streaming, polling and log settings with JSON/TOML
//! persistence and validation.

pub mod config;
pub mod error;

pub use config::{ConnectionSettings, LinkConfig, LogSettings, PollingSettings, StreamingSettings};
pub use error::{SettingsError, SettingsResult};
