//! GRBL response classification
//!
//! Every line read from the controller maps to exactly one
//! [`GrblResponse`]. Checks run in a fixed order: status report,
//! acknowledgement, error, alarm, setting readback, startup banner, then
//! everything else.

use super::error_decoder;
use super::status_parser::StatusReport;
use serde::{Deserialize, Serialize};
use std::fmt;

/// GRBL response types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GrblResponse {
    /// `<...>` status report
    Status(StatusReport),
    /// `ok` acknowledgement
    Ok,
    /// Error response, with its numeric code when present
    Error(Option<u8>),
    /// `ALARM:N`
    Alarm(u8),
    /// `$N=value` setting readback
    Setting { number: u16, value: String },
    /// Startup banner, printed after reset or power-up
    Welcome(String),
    /// Reader gave up on the transport
    Disconnected(String),
    /// Feedback messages and anything unrecognized
    Other(String),
}

impl GrblResponse {
    /// Classify one received line
    ///
    /// Returns `None` for blank lines. Never yields `Disconnected`; that
    /// variant is produced by the reader, not by the wire.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if line.starts_with('<') {
            if let Some(report) = StatusReport::parse(line) {
                return Some(GrblResponse::Status(report));
            }
        }

        if line.eq_ignore_ascii_case("ok") {
            return Some(GrblResponse::Ok);
        }

        // Bracketed feedback such as [MSG:...] never consumes a window slot.
        let lower = line.to_ascii_lowercase();
        if !line.starts_with('[') && lower.contains("error") {
            return Some(GrblResponse::Error(parse_code(line)));
        }

        if lower.starts_with("alarm:") {
            if let Some(code) = parse_code(line) {
                return Some(GrblResponse::Alarm(code));
            }
        }

        if let Some(setting) = parse_setting(line) {
            return Some(setting);
        }

        if line.starts_with("Grbl ") || line.starts_with("GrblHAL ") {
            return Some(GrblResponse::Welcome(line.to_string()));
        }

        Some(GrblResponse::Other(line.to_string()))
    }

    /// Whether this response frees one in-flight window slot
    pub fn frees_slot(&self) -> bool {
        matches!(self, GrblResponse::Ok | GrblResponse::Error(_))
    }

    /// Whether the line is an error or alarm
    pub fn is_fault(&self) -> bool {
        matches!(self, GrblResponse::Error(_) | GrblResponse::Alarm(_))
    }
}

impl fmt::Display for GrblResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(report) => write!(f, "status:{}", report.state_token),
            Self::Ok => write!(f, "ok"),
            Self::Error(Some(code)) => write!(f, "{}", error_decoder::format_error(*code)),
            Self::Error(None) => write!(f, "error"),
            Self::Alarm(code) => write!(f, "{}", error_decoder::format_alarm(*code)),
            Self::Setting { number, value } => write!(f, "${}={}", number, value),
            Self::Welcome(banner) => write!(f, "welcome:{}", banner),
            Self::Disconnected(reason) => write!(f, "disconnected:{}", reason),
            Self::Other(text) => write!(f, "{}", text),
        }
    }
}

/// Leading digits after the first ':'
fn parse_code(line: &str) -> Option<u8> {
    let (_, rest) = line.split_once(':')?;
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn parse_setting(line: &str) -> Option<GrblResponse> {
    let (key, value) = line.strip_prefix('$')?.split_once('=')?;
    let number = key.trim().parse::<u16>().ok()?;
    Some(GrblResponse::Setting {
        number,
        value: value.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_extraction() {
        assert_eq!(parse_code("error:20"), Some(20));
        assert_eq!(parse_code("error: 9"), Some(9));
        assert_eq!(parse_code("error:Bad number format"), None);
        assert_eq!(parse_code("error"), None);
    }

    #[test]
    fn test_setting_requires_numeric_key() {
        assert!(parse_setting("$J=G91 X1 F100").is_none());
        assert_eq!(
            parse_setting("$22=1"),
            Some(GrblResponse::Setting {
                number: 22,
                value: "1".to_string()
            })
        );
    }
}
