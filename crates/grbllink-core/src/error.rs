//! Error handling for GRBL Link
//!
//! Error types for each layer of the link:
//! - Connection errors (transport open/close and link loss)
//! - Controller errors (operation guards, stream lifecycle, timeouts)
//! - G-Code errors (outbound command validation and arc conversion)
//!
//! All error types use `thiserror`. Protocol errors reported by the controller
//! itself (`error:N` lines) are not Rust errors; they surface as link events.

use thiserror::Error;

/// Connection error type
///
/// Represents failures opening, using or closing the serial transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// No transport is open
    #[error("Not connected")]
    NotConnected,

    /// A connection is already open or being established
    #[error("Already connected to {port}")]
    AlreadyConnected {
        /// The port currently in use.
        port: String,
    },

    /// Connection lost while in use
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// Transport-level I/O failure that did not end the session
    #[error("I/O error: {reason}")]
    IoError {
        /// The reason for the I/O error.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },
}

/// Controller error type
///
/// Raised locally when an operation is not permitted in the current
/// link state, before anything is written to the wire.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// A program is already streaming
    #[error("A program stream is already active")]
    StreamActive,

    /// Program contained no sendable commands
    #[error("Program contains no commands")]
    EmptyProgram,

    /// Step advance requested outside single-step mode
    #[error("Single-step mode is not active")]
    NotStepping,

    /// Homing requested while `$22` reports homing disabled
    #[error("Homing is disabled on the controller ($22=0)")]
    HomingDisabled,

    /// Controller is alarmed and must be unlocked or reset first
    #[error("Controller is in alarm state: {state}")]
    Alarmed {
        /// Display form of the current run state.
        state: String,
    },

    /// Operation timed out
    #[error("Controller operation timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// Controller answered with an error line
    #[error("Command rejected: {reason}")]
    CommandRejected {
        /// The reason the command was rejected.
        reason: String,
    },
}

/// G-Code error type
///
/// Best-effort validation of outbound commands. A rejected line is never
/// written to the controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GcodeError {
    /// A word could not be tokenized
    #[error("Invalid word '{word}' in: {line}")]
    InvalidWord {
        /// The offending line.
        line: String,
        /// The word that failed to parse.
        word: String,
    },

    /// Arc geometry cannot be realized
    #[error("Invalid arc in '{line}': {reason}")]
    ArcGeometry {
        /// The offending line.
        line: String,
        /// Why the arc is invalid.
        reason: String,
    },

    /// Line can never fit in the controller's receive buffer
    #[error("Command of {cost} bytes exceeds buffer capacity {capacity}: {line}")]
    ExceedsCapacity {
        /// The offending line.
        line: String,
        /// Window cost of the line.
        cost: usize,
        /// Configured window capacity.
        capacity: usize,
    },
}

/// Main error type for GRBL Link
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Controller error
    #[error(transparent)]
    Controller(#[from] ControllerError),

    /// G-Code error
    #[error(transparent)]
    Gcode(#[from] GcodeError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Controller(ControllerError::Timeout { .. }))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a G-Code error
    pub fn is_gcode_error(&self) -> bool {
        matches!(self, Error::Gcode(_))
    }

    /// Check if this is a controller error
    pub fn is_controller_error(&self) -> bool {
        matches!(self, Error::Controller(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
