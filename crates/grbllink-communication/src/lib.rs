//! # GRBL Link Communication
//!
//! Serial transport, GRBL protocol handling and buffered streaming.
//! A [`LinkSession`] ties the pieces together for one connection and
//! [`LinkHandle`] drives it from a tokio task.

pub mod comm_log;
pub mod communication;
pub mod firmware;
pub mod gcode;
pub mod handle;
pub mod session;
pub mod state;
pub mod streaming;

pub use comm_log::CommLog;
pub use communication::{
    blocking_exchange, list_ports, ConnectionParams, PortPair, PortReader, PortWriter,
    SerialPortInfo, SerialTransport, Transport, VirtualPort,
};
pub use firmware::grbl::{GrblResponse, GrblSettings, StatusReport};
pub use gcode::{prepare_program, ProgramLine};
pub use handle::{LinkCommand, LinkHandle};
pub use session::LinkSession;
pub use state::StateTracker;
pub use streaming::{CommandStreamer, InFlightWindow, PollScheduler};
