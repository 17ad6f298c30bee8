//! # GRBL Link Core
//!
//! Core types for GRBL Link.
//! Provides the error hierarchy, the data model mirrored from the
//! controller and the event types published by a link session.

pub mod data;
pub mod error;
pub mod event;

pub use data::{
    BufferPolicy, CommDirection, CommLogEntry, ErrorPolicy, LinkSnapshot, Position, RunState,
    StreamPhase,
};

pub use error::{ConnectionError, ControllerError, Error, GcodeError, Result};

pub use event::{DisconnectReason, EventDispatcher, EventKind, LinkEvent};
