//! GRBL protocol support
//!
//! Response classification, status report parsing, error/alarm decoding and
//! the settings store, plus the realtime bytes and command strings the link
//! writes.

pub mod error_decoder;
pub mod response_parser;
pub mod settings;
pub mod status_parser;

pub use response_parser::GrblResponse;
pub use settings::GrblSettings;
pub use status_parser::StatusReport;

/// Realtime bytes, acted on by the controller immediately and never
/// counted against the receive buffer
pub mod realtime {
    /// Status report query
    pub const STATUS_QUERY: u8 = b'?';
    /// Feed hold
    pub const FEED_HOLD: u8 = b'!';
    /// Cycle start / resume
    pub const CYCLE_RESUME: u8 = b'~';
    /// Soft reset (Ctrl-X)
    pub const SOFT_RESET: u8 = 0x18;

    /// Log form of a realtime byte
    pub fn label(byte: u8) -> String {
        match byte {
            SOFT_RESET => "^X".to_string(),
            b if b.is_ascii_graphic() => (b as char).to_string(),
            b => format!("0x{:02X}", b),
        }
    }
}

/// Line commands
pub mod commands {
    /// Run the homing cycle
    pub const HOME: &str = "$H";
    /// Clear an alarm lock
    pub const UNLOCK: &str = "$X";
    /// Dump all settings
    pub const SETTINGS: &str = "$$";
    /// Make the current position the work origin of G54
    pub const SET_WORK_ORIGIN: &str = "G10 L20 P1 X0 Y0 Z0";
    /// Laser/spindle off
    pub const LASER_OFF: &str = "M5";

    /// Incremental jog; axes with no distance are omitted
    pub fn jog(x: Option<f64>, y: Option<f64>, z: Option<f64>, feed: f64) -> String {
        let mut command = String::from("$J=G91");
        for (axis, distance) in [('X', x), ('Y', y), ('Z', z)] {
            if let Some(distance) = distance {
                command.push_str(&format!(" {}{:.3}", axis, distance));
            }
        }
        command.push_str(&format!(" F{:.0}", feed));
        command
    }

    /// Rapid to the work origin in absolute mode
    pub fn go_to_origin() -> [&'static str; 2] {
        ["G90", "G0 X0 Y0 Z0"]
    }
}
