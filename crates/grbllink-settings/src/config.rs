//! Link configuration
//!
//! One `LinkConfig` describes a session: how to open the port, how to
//! account the controller's receive buffer, how often to poll and how much
//! communication history to keep. Files are JSON or TOML, chosen by
//! extension, and every section falls back to its defaults when omitted.

use crate::error::{SettingsError, SettingsResult};
use grbllink_core::{BufferPolicy, ErrorPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Serial connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port name (`/dev/ttyUSB0`, `COM3`)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Read/write timeout in milliseconds
    pub timeout_ms: u64,
    /// Wait after opening before talking to the controller
    pub settle_delay_ms: u64,
    /// Commands queued once the session is ready
    pub startup_commands: Vec<String>,
    /// Consecutive disconnect-class errors before teardown
    pub disconnect_threshold: u32,
    /// Reader sleep when no bytes are available
    pub read_idle_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115200,
            timeout_ms: 2000,
            settle_delay_ms: 2000,
            startup_commands: vec!["$$".to_string()],
            disconnect_threshold: 3,
            read_idle_ms: 1,
        }
    }
}

impl ConnectionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn read_idle(&self) -> Duration {
        Duration::from_millis(self.read_idle_ms)
    }
}

/// Program streaming settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Window accounting
    pub buffer_policy: BufferPolicy,
    /// Window capacity in commands or bytes, depending on the policy
    pub capacity: usize,
    /// Reaction to `error:N` during a stream
    pub error_policy: ErrorPolicy,
    /// Rewrite `G2/G3 ... R` arcs into center-offset form before sending
    pub convert_radius_arcs: bool,
    /// Responses dispatched per tick
    pub response_batch: usize,
    /// Soft-reset bytes written on abort
    pub abort_repeat: usize,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            buffer_policy: BufferPolicy::CommandCount,
            capacity: BufferPolicy::CommandCount.default_capacity(),
            error_policy: ErrorPolicy::Continue,
            convert_radius_arcs: true,
            response_batch: 10,
            abort_repeat: 3,
        }
    }
}

/// Status poll intervals in milliseconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    /// Single-step mode
    pub step_mode_ms: u64,
    /// Streaming, or controller in Run/Jog/Hold/Home
    pub active_ms: u64,
    /// Idle shortly after a command
    pub settle_ms: u64,
    /// How long "shortly after a command" lasts
    pub settle_window_ms: u64,
    /// Idle
    pub idle_ms: u64,
    /// Alarm
    pub alarm_ms: u64,
    /// Burst polls after a work-origin change
    pub burst_count: u32,
    /// Interval of the async driver's tick
    pub tick_ms: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            step_mode_ms: 500,
            active_ms: 50,
            settle_ms: 200,
            settle_window_ms: 2000,
            idle_ms: 2000,
            alarm_ms: 5000,
            burst_count: 5,
            tick_ms: 10,
        }
    }
}

/// Communication log settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Entries kept before the oldest are dropped
    pub capacity: usize,
    /// Hide status queries, status reports and bare `ok`
    pub filter_noise: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            capacity: 1000,
            filter_noise: true,
        }
    }
}

/// Complete link configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Streaming settings
    pub streaming: StreamingSettings,
    /// Poll intervals
    pub polling: PollingSettings,
    /// Communication log
    pub log: LogSettings,
}

impl LinkConfig {
    /// Default location: `<config dir>/grbllink/config.toml`
    pub fn default_path() -> SettingsResult<PathBuf> {
        let dir = dirs::config_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| SettingsError::ConfigDirectory("no config directory".to_string()))?;
        Ok(dir.join("grbllink").join("config.toml"))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let content = std::fs::read_to_string(path)?;

        let config: Self = match extension(path) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => return Err(SettingsError::UnsupportedFormat(path.display().to_string())),
        };

        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded link config");
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise return defaults
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML), creating parent directories
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match extension(path) {
            Some("json") => serde_json::to_string_pretty(self)?,
            Some("toml") => toml::to_string_pretty(self)?,
            _ => return Err(SettingsError::UnsupportedFormat(path.display().to_string())),
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        let connection = &self.connection;
        if connection.baud_rate == 0 {
            return Err(SettingsError::invalid("connection.baud_rate", "must be > 0"));
        }
        if connection.timeout_ms == 0 {
            return Err(SettingsError::invalid("connection.timeout_ms", "must be > 0"));
        }
        if connection.disconnect_threshold == 0 {
            return Err(SettingsError::invalid(
                "connection.disconnect_threshold",
                "must be > 0",
            ));
        }

        let streaming = &self.streaming;
        if streaming.capacity == 0 {
            return Err(SettingsError::invalid("streaming.capacity", "must be > 0"));
        }
        // A byte window must at least hold a short command and its terminator.
        if streaming.buffer_policy == BufferPolicy::ByteCount && streaming.capacity < 16 {
            return Err(SettingsError::invalid(
                "streaming.capacity",
                "byte_count windows need at least 16 bytes",
            ));
        }
        if streaming.response_batch == 0 {
            return Err(SettingsError::invalid("streaming.response_batch", "must be > 0"));
        }
        if streaming.abort_repeat == 0 {
            return Err(SettingsError::invalid("streaming.abort_repeat", "must be > 0"));
        }

        let polling = &self.polling;
        let intervals = [
            ("polling.step_mode_ms", polling.step_mode_ms),
            ("polling.active_ms", polling.active_ms),
            ("polling.settle_ms", polling.settle_ms),
            ("polling.idle_ms", polling.idle_ms),
            ("polling.alarm_ms", polling.alarm_ms),
            ("polling.tick_ms", polling.tick_ms),
        ];
        for (key, value) in intervals {
            if value == 0 {
                return Err(SettingsError::invalid(key, "must be > 0"));
            }
        }

        if self.log.capacity == 0 {
            return Err(SettingsError::invalid("log.capacity", "must be > 0"));
        }
        Ok(())
    }
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|ext| ext.to_str())
}
