//! Transport fault classification
//!
//! Serial drivers report an unplugged adapter in many ways, most of them
//! only distinguishable by message text. Errors are sorted into transient
//! faults, which are retried, and disconnect faults, which count towards
//! tearing the session down.

use std::io;

/// Message fragments that indicate the device is gone
const DISCONNECT_INDICATORS: &[&str] = &[
    "access is denied",
    "invalid handle",
    "device not configured",
    "device is not open",
    "port is not open",
    "i/o error",
    "input/output error",
    "no such device",
    "bad file descriptor",
];

/// Classification of an I/O error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoFault {
    /// Retry on the next opportunity
    Transient,
    /// Counts towards declaring the link lost
    Disconnect,
}

/// Sort an I/O error into a fault class
pub fn classify_io_error(err: &io::Error) -> IoFault {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
            IoFault::Transient
        }
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected
        | io::ErrorKind::NotFound
        | io::ErrorKind::PermissionDenied
        | io::ErrorKind::UnexpectedEof => IoFault::Disconnect,
        _ => classify_message(&err.to_string()),
    }
}

/// Sort an error message into a fault class
pub fn classify_message(message: &str) -> IoFault {
    let message = message.to_ascii_lowercase();
    if DISCONNECT_INDICATORS
        .iter()
        .any(|indicator| message.contains(indicator))
    {
        IoFault::Disconnect
    } else {
        IoFault::Transient
    }
}

/// Counts consecutive disconnect faults
///
/// A success or a transient fault resets the count. The link is declared
/// lost once the count reaches the threshold.
#[derive(Debug, Clone)]
pub struct DisconnectDebounce {
    threshold: u32,
    consecutive: u32,
}

impl DisconnectDebounce {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            consecutive: 0,
        }
    }

    /// Record a fault; `true` when the threshold is reached
    pub fn record(&mut self, fault: IoFault) -> bool {
        match fault {
            IoFault::Transient => {
                self.consecutive = 0;
                false
            }
            IoFault::Disconnect => {
                self.consecutive += 1;
                self.consecutive >= self.threshold
            }
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_kind() {
        let timeout = io::Error::new(io::ErrorKind::TimedOut, "Operation timed out");
        assert_eq!(classify_io_error(&timeout), IoFault::Transient);

        let pipe = io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe");
        assert_eq!(classify_io_error(&pipe), IoFault::Disconnect);
    }

    #[test]
    fn test_classify_by_message() {
        let err = io::Error::other("Input/output error (os error 5)");
        assert_eq!(classify_io_error(&err), IoFault::Disconnect);
        assert_eq!(classify_message("Access is denied."), IoFault::Disconnect);
        assert_eq!(classify_message("The handle is an Invalid Handle"), IoFault::Disconnect);
        assert_eq!(classify_message("framing error"), IoFault::Transient);
    }

    #[test]
    fn test_three_strikes() {
        let mut debounce = DisconnectDebounce::new(3);
        assert!(!debounce.record(IoFault::Disconnect));
        assert!(!debounce.record(IoFault::Disconnect));
        assert!(debounce.record(IoFault::Disconnect));
    }

    #[test]
    fn test_transient_resets_count() {
        let mut debounce = DisconnectDebounce::new(3);
        debounce.record(IoFault::Disconnect);
        debounce.record(IoFault::Disconnect);
        assert!(!debounce.record(IoFault::Transient));
        assert_eq!(debounce.consecutive(), 0);
        assert!(!debounce.record(IoFault::Disconnect));

        debounce.record_success();
        assert_eq!(debounce.consecutive(), 0);
    }
}
