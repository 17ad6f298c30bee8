//! Buffered streaming
//!
//! Window accounting against the controller's receive buffer, the program
//! stream state machine and the status poll schedule.

pub mod poller;
pub mod streamer;
pub mod window;

pub use poller::{PollContext, PollScheduler};
pub use streamer::{CommandStreamer, QueuedCommand, StreamProgress};
pub use window::{CommandOrigin, InFlightWindow, SentCommand};
