//! Event system for the link
//!
//! Provides:
//! - Event types for connection, state, stream and protocol changes
//! - Event dispatcher for publishing events to subscribers

use crate::data::{Position, RunState};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Why a session ended
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectReason {
    /// Orderly disconnect requested by the operator
    Requested,
    /// Transport failed repeatedly and was torn down
    Lost(String),
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::Requested => write!(f, "disconnect requested"),
            DisconnectReason::Lost(reason) => write!(f, "connection lost: {}", reason),
        }
    }
}

/// Coarse event category for filtering and structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Connection lifecycle
    Connection,
    /// Run state or position
    Machine,
    /// Program stream lifecycle
    Stream,
    /// Controller-reported errors and alarms, local rejections
    Fault,
    /// Settings and informational lines
    Info,
}

/// Link event types
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// Transport open, settling
    Connecting {
        /// Port being opened.
        port: String,
    },
    /// Session ready for commands
    Connected {
        /// Identifier of this session.
        session_id: Uuid,
        /// Port in use.
        port: String,
    },
    /// Session ended
    Disconnected(DisconnectReason),
    /// Mirrored run state changed
    StateChanged(RunState),
    /// A status report moved the machine
    PositionChanged {
        /// Machine position.
        machine: Position,
        /// Work position.
        work: Position,
    },
    /// A stream line was written
    LineSent {
        /// Lines sent so far.
        sent: usize,
        /// Stream length.
        total: usize,
    },
    /// Single-step mode is waiting for an advance
    StepAwaiting {
        /// Lines sent so far.
        sent: usize,
    },
    /// Stream finished and motion stopped
    StreamCompleted {
        /// Lines streamed.
        lines: usize,
    },
    /// Stream cancelled by the operator
    StreamAborted {
        /// Lines sent before the abort.
        sent: usize,
        /// Stream length.
        total: usize,
    },
    /// Stream ended by a fault
    StreamFailed {
        /// What went wrong.
        message: String,
    },
    /// The controller answered `error:N`
    ProtocolError {
        /// Numeric code, when present.
        code: Option<u8>,
        /// Decoded cause.
        message: String,
        /// Command the error was matched to.
        command: Option<String>,
    },
    /// The controller raised `ALARM:N`
    Alarm {
        /// Alarm code.
        code: u8,
        /// Decoded cause.
        message: String,
    },
    /// An outbound command failed local validation and was not sent
    CommandRejected {
        /// The rejected command.
        command: String,
        /// Why it was rejected.
        reason: String,
    },
    /// An operation issued through the async handle failed
    OperationFailed {
        /// Operation name.
        operation: String,
        /// Error text.
        message: String,
    },
    /// A `$N=value` line was read back
    SettingReceived {
        /// Setting number.
        number: u16,
        /// Raw value.
        value: String,
    },
    /// The controller printed its startup banner (soft reset or power cycle)
    ControllerReset(String),
}

impl LinkEvent {
    /// Category of this event
    pub fn kind(&self) -> EventKind {
        match self {
            LinkEvent::Connecting { .. }
            | LinkEvent::Connected { .. }
            | LinkEvent::Disconnected(_) => EventKind::Connection,
            LinkEvent::StateChanged(_)
            | LinkEvent::PositionChanged { .. }
            | LinkEvent::ControllerReset(_) => EventKind::Machine,
            LinkEvent::LineSent { .. }
            | LinkEvent::StepAwaiting { .. }
            | LinkEvent::StreamCompleted { .. }
            | LinkEvent::StreamAborted { .. } => EventKind::Stream,
            LinkEvent::StreamFailed { .. }
            | LinkEvent::ProtocolError { .. }
            | LinkEvent::Alarm { .. }
            | LinkEvent::CommandRejected { .. }
            | LinkEvent::OperationFailed { .. } => EventKind::Fault,
            LinkEvent::SettingReceived { .. } => EventKind::Info,
        }
    }

    /// Whether this event ends a program stream
    pub fn ends_stream(&self) -> bool {
        matches!(
            self,
            LinkEvent::StreamCompleted { .. }
                | LinkEvent::StreamAborted { .. }
                | LinkEvent::StreamFailed { .. }
        )
    }
}

impl std::fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkEvent::Connecting { port } => write!(f, "Connecting to {}", port),
            LinkEvent::Connected { port, .. } => write!(f, "Connected to {}", port),
            LinkEvent::Disconnected(reason) => write!(f, "Disconnected ({})", reason),
            LinkEvent::StateChanged(state) => write!(f, "State: {}", state),
            LinkEvent::PositionChanged { machine, work } => {
                write!(f, "Position - Machine: {}, Work: {}", machine, work)
            }
            LinkEvent::LineSent { sent, total } => write!(f, "Sent {}/{}", sent, total),
            LinkEvent::StepAwaiting { sent } => {
                write!(f, "Step mode: {} sent, waiting for advance", sent)
            }
            LinkEvent::StreamCompleted { lines } => write!(f, "Stream complete ({} lines)", lines),
            LinkEvent::StreamAborted { sent, total } => {
                write!(f, "Stream aborted after {}/{}", sent, total)
            }
            LinkEvent::StreamFailed { message } => write!(f, "Stream failed: {}", message),
            LinkEvent::ProtocolError {
                code,
                message,
                command,
            } => {
                match code {
                    Some(code) => write!(f, "error:{} - {}", code, message)?,
                    None => write!(f, "error - {}", message)?,
                }
                if let Some(command) = command {
                    write!(f, " [{}]", command)?;
                }
                Ok(())
            }
            LinkEvent::Alarm { code, message } => write!(f, "ALARM:{} - {}", code, message),
            LinkEvent::CommandRejected { command, reason } => {
                write!(f, "Rejected '{}': {}", command, reason)
            }
            LinkEvent::OperationFailed { operation, message } => {
                write!(f, "{} failed: {}", operation, message)
            }
            LinkEvent::SettingReceived { number, value } => write!(f, "${}={}", number, value),
            LinkEvent::ControllerReset(banner) => write!(f, "Controller reset: {}", banner),
        }
    }
}

/// Event dispatcher for publishing events to subscribers
#[derive(Clone)]
pub struct EventDispatcher {
    /// Broadcast sender channel for link events.
    tx: broadcast::Sender<LinkEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher
    ///
    /// # Arguments
    /// * `buffer_size` - Size of the broadcast buffer (default 256)
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.tx.subscribe()
    }

    /// Publish an event to all subscribers
    ///
    /// Returns the number of subscribers that received it; an event with no
    /// subscribers is dropped.
    pub fn publish(&self, event: LinkEvent) -> usize {
        tracing::debug!(kind = ?event.kind(), "{}", event);
        self.tx.send(event).unwrap_or(0)
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(256)
    }
}
