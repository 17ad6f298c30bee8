//! # GRBL Link
//!
//! Streaming client for GRBL CNC and laser controllers over a serial port:
//! - Buffered G-code streaming with a command-count or byte-count window
//! - Mirrored run state and machine/work positions from status reports
//! - Adaptive status polling and recovery from errors, alarms and resets
//!
//! ## Architecture
//!
//! GRBL Link is organized as a workspace with multiple crates:
//!
//! 1. **grbllink-core** - Data model, error types, events
//! 2. **grbllink-communication** - Transport, GRBL protocol, streaming, session
//! 3. **grbllink-settings** - Persisted link configuration
//! 4. **grbllink** - Command-line binary that integrates all crates

pub use grbllink_communication::{firmware, gcode, streaming};
pub use grbllink_core::data;

pub use grbllink_core::{
    BufferPolicy, CommDirection, CommLogEntry, ConnectionError, ControllerError,
    DisconnectReason, Error, ErrorPolicy, EventDispatcher, EventKind, GcodeError, LinkEvent,
    LinkSnapshot, Position, Result, RunState, StreamPhase,
};

pub use grbllink_communication::{
    blocking_exchange, list_ports, prepare_program, CommLog, ConnectionParams, GrblResponse,
    GrblSettings, LinkCommand, LinkHandle, LinkSession, PortPair, ProgramLine, SerialPortInfo,
    SerialTransport, StateTracker, StatusReport, Transport, VirtualPort,
};

pub use grbllink_settings::{
    ConnectionSettings, LinkConfig, LogSettings, PollingSettings, SettingsError,
    StreamingSettings,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output with pretty formatting on stderr
/// - RUST_LOG environment variable support
///
/// `verbose` lowers the default directive from INFO to DEBUG.
pub fn init_logging(verbose: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let env_filter = EnvFilter::from_default_env().add_directive(level.into());

    // Program output goes to stdout, so logs stay on stderr.
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_line_number(true)
        .pretty();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))?;

    Ok(())
}

/// Initialize logging as one JSON object per line, for log collectors
pub fn init_json_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {}", e))?;

    Ok(())
}
