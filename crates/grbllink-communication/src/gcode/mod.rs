//! Outbound G-code handling
//!
//! Tokenizing, modal tracking, radius-arc conversion and program
//! preparation for lines about to be streamed.

pub mod arc;
pub mod modal;
pub mod program;
pub mod words;

pub use arc::{center_offset, convert_radius_arc, ArcDirection};
pub use modal::{ModalTracker, OriginChange};
pub use program::{prepare_program, ProgramLine};
pub use words::Block;
