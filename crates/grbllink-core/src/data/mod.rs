//! Data models for GRBL Link
//!
//! Positions, run states, streaming policies and the observable link
//! snapshot shared by the session and its consumers.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Cartesian position in controller units (X, Y, Z)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
}

impl Position {
    /// Origin
    pub const ZERO: Position = Position {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Create a new position with X, Y, Z coordinates
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Position {
    type Output = Position;

    fn sub(self, rhs: Position) -> Position {
        Position::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{:.3} Y{:.3} Z{:.3}", self.x, self.y, self.z)
    }
}

/// Controller run state as mirrored by the link
///
/// `Disconnected`, `Connecting` and `Error` are link-local states; the rest
/// mirror the state token of GRBL status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunState {
    /// No transport open
    #[default]
    Disconnected,
    /// Transport open, waiting for the controller to settle
    Connecting,
    /// Connected and idle, ready for commands
    Idle,
    /// Executing motion
    Run,
    /// Jogging
    Jog,
    /// Feed hold, awaiting resume
    Hold,
    /// Homing cycle in progress
    Home,
    /// Alarm lock (requires unlock or reset)
    Alarm,
    /// Safety door open
    Door,
    /// Check mode (G-code parsed without motion)
    Check,
    /// Link fault not attributable to a controller state
    Error,
}

impl RunState {
    /// Map the state token of a status report (`Idle`, `Hold:0`, `Door:1` ...)
    ///
    /// Returns `None` for tokens the link does not model, such as `Sleep`.
    pub fn from_report_token(token: &str) -> Option<Self> {
        let base = token.split(':').next().unwrap_or(token).trim();
        match base {
            "Idle" => Some(RunState::Idle),
            "Run" => Some(RunState::Run),
            "Jog" => Some(RunState::Jog),
            "Hold" => Some(RunState::Hold),
            "Home" => Some(RunState::Home),
            "Alarm" => Some(RunState::Alarm),
            "Door" => Some(RunState::Door),
            "Check" => Some(RunState::Check),
            _ => None,
        }
    }

    /// Check if this state indicates a live connection
    pub fn is_connected(&self) -> bool {
        !matches!(
            self,
            RunState::Disconnected | RunState::Connecting | RunState::Error
        )
    }

    /// Check if the machine may still be moving (or holding a motion)
    pub fn is_moving(&self) -> bool {
        matches!(
            self,
            RunState::Run | RunState::Jog | RunState::Hold | RunState::Home
        )
    }

    /// States in which a finished stream is confirmed as complete
    pub fn is_motion_stopped(&self) -> bool {
        matches!(self, RunState::Idle | RunState::Check)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Disconnected => "Disconnected",
            RunState::Connecting => "Connecting",
            RunState::Idle => "Idle",
            RunState::Run => "Run",
            RunState::Jog => "Jog",
            RunState::Hold => "Hold",
            RunState::Home => "Home",
            RunState::Alarm => "Alarm",
            RunState::Door => "Door",
            RunState::Check => "Check",
            RunState::Error => "Error",
        };
        f.write_str(name)
    }
}

/// How the in-flight window is accounted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferPolicy {
    /// Each command costs one slot
    #[default]
    CommandCount,
    /// Each command costs its byte length plus the line terminator
    ByteCount,
}

impl BufferPolicy {
    /// Documented capacity of the controller for this policy
    pub fn default_capacity(&self) -> usize {
        match self {
            BufferPolicy::CommandCount => 4,
            BufferPolicy::ByteCount => 127,
        }
    }
}

/// What a protocol error does to an active stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Log the error, free its slot and keep streaming
    #[default]
    Continue,
    /// Cancel the stream on the first error
    Abort,
}

/// Lifecycle of one program stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamPhase {
    /// No stream
    #[default]
    Idle,
    /// Window has room and commands are pending
    Filling,
    /// Window full, or waiting for a step advance
    Waiting,
    /// Everything sent, acknowledgements outstanding
    Draining,
    /// Everything acknowledged, waiting for motion to stop
    Confirming,
    /// Motion stopped after the last acknowledgement
    Complete,
}

impl fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Direction of a communication log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommDirection {
    /// Written to the controller
    Sent,
    /// Received from the controller
    Received,
}

/// One line of the operator-visible communication log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommLogEntry {
    /// Local wall-clock time of the event
    pub timestamp: DateTime<Local>,
    /// Sent or received
    pub direction: CommDirection,
    /// The line as written or read, without terminator
    pub text: String,
    /// Whether the line was an error or alarm response
    pub is_error: bool,
}

impl fmt::Display for CommLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.direction {
            CommDirection::Sent => ">>",
            CommDirection::Received => "<<",
        };
        write!(
            f,
            "[{}] {} {}",
            self.timestamp.format("%H:%M:%S%.3f"),
            arrow,
            self.text
        )
    }
}

/// Consistent view of the link taken between ticks
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkSnapshot {
    /// Mirrored run state
    pub state: RunState,
    /// Machine position
    pub machine_pos: Position,
    /// Work position
    pub work_pos: Position,
    /// Work coordinate offset
    pub work_offset: Position,
    /// Laser/spindle enabled by the last M3/M4/M5 sent
    pub laser_on: bool,
    /// `$22` homing enable as last reported
    pub homing_enabled: bool,
    /// Commands sent but not yet acknowledged
    pub in_flight: usize,
    /// Window units in use
    pub window_used: usize,
    /// Window capacity
    pub window_capacity: usize,
    /// Commands waiting to be sent
    pub pending: usize,
    /// Stream lines sent so far
    pub sent_lines: usize,
    /// Stream length
    pub total_lines: usize,
    /// Stream phase
    pub phase: StreamPhase,
    /// Single-step mode is waiting for an advance
    pub awaiting_step: bool,
    /// Latest communication log entries, oldest first
    pub recent_log: Vec<CommLogEntry>,
}

impl LinkSnapshot {
    /// Whether a program stream is in progress
    pub fn is_streaming(&self) -> bool {
        !matches!(self.phase, StreamPhase::Idle | StreamPhase::Complete)
    }

    /// Stream progress in percent
    pub fn progress_percent(&self) -> f64 {
        if self.total_lines == 0 {
            return 0.0;
        }
        (self.sent_lines as f64 / self.total_lines as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_tokens() {
        assert_eq!(RunState::from_report_token("Idle"), Some(RunState::Idle));
        assert_eq!(RunState::from_report_token("Hold:0"), Some(RunState::Hold));
        assert_eq!(RunState::from_report_token("Door:2"), Some(RunState::Door));
        assert_eq!(RunState::from_report_token("Sleep"), None);
        assert_eq!(RunState::from_report_token("idle"), None);
    }

    #[test]
    fn test_motion_classes() {
        assert!(RunState::Run.is_moving());
        assert!(RunState::Hold.is_moving());
        assert!(!RunState::Idle.is_moving());
        assert!(RunState::Check.is_motion_stopped());
        assert!(!RunState::Alarm.is_motion_stopped());
        assert!(!RunState::Connecting.is_connected());
        assert!(RunState::Alarm.is_connected());
    }

    #[test]
    fn test_position_arithmetic() {
        let mpos = Position::new(10.0, 20.0, -5.0);
        let wco = Position::new(10.0, 10.0, 0.0);
        assert_eq!(mpos - wco, Position::new(0.0, 10.0, -5.0));
        assert_eq!((mpos - wco) + wco, mpos);
    }

    #[test]
    fn test_policy_serde() {
        let json = serde_json::to_string(&BufferPolicy::ByteCount).unwrap();
        assert_eq!(json, "\"byte_count\"");
        let policy: ErrorPolicy = serde_json::from_str("\"abort\"").unwrap();
        assert_eq!(policy, ErrorPolicy::Abort);
        assert_eq!(BufferPolicy::ByteCount.default_capacity(), 127);
    }

    #[test]
    fn test_snapshot_progress() {
        let snapshot = LinkSnapshot {
            sent_lines: 1,
            total_lines: 4,
            phase: StreamPhase::Waiting,
            ..Default::default()
        };
        assert!(snapshot.is_streaming());
        assert_eq!(snapshot.progress_percent(), 25.0);
        assert!(!LinkSnapshot::default().is_streaming());
    }
}
