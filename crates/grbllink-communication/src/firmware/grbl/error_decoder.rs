//! GRBL error and alarm code decoder
//!
//! Maps the numeric part of `error:N` and `ALARM:N` lines to a short cause.
//! Codes follow GRBL 1.1.

/// Cause of a GRBL `error:N` response, if the code is known
pub fn error_cause(code: u8) -> Option<&'static str> {
    let cause = match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid '$' statement",
        4 => "Negative value",
        5 => "Homing not enabled",
        6 => "Step pulse below 3 microseconds",
        7 => "EEPROM read failed, defaults restored",
        8 => "'$' command needs Idle state",
        9 => "G-code locked out during alarm or jog",
        10 => "Soft limits need homing enabled",
        11 => "Line too long",
        12 => "Step rate exceeded",
        13 => "Safety door opened",
        14 => "Startup line too long",
        15 => "Jog target exceeds travel",
        16 => "Invalid jog command",
        17 => "Laser mode needs PWM output",
        20 => "Unsupported or invalid G-code command",
        21 => "Modal group violation",
        22 => "Feed rate not set",
        23 => "Command requires an integer value",
        24 => "Two commands use axis words in one block",
        25 => "Repeated word in block",
        26 => "Missing axis words",
        27 => "Line number out of range",
        28 => "Missing P or L value",
        29 => "Unsupported work coordinate system",
        30 => "G53 needs G0 or G1",
        31 => "Unused axis words with G80 active",
        32 => "Arc has no axis words in the selected plane",
        33 => "Invalid motion target",
        34 => "Arc radius error",
        35 => "Arc missing offset word in the selected plane",
        36 => "Unused words in block",
        37 => "Tool length offset axis not assigned",
        38 => "Tool number out of range",
        _ => return None,
    };
    Some(cause)
}

/// Cause of a GRBL `ALARM:N` line, if the code is known
pub fn alarm_cause(code: u8) -> Option<&'static str> {
    let cause = match code {
        1 => "Hard limit triggered, position lost",
        2 => "Soft limit exceeded",
        3 => "Reset while in motion, position lost",
        4 => "Probe not in expected initial state",
        5 => "Probe did not contact the workpiece",
        6 => "Homing reset",
        7 => "Safety door opened during homing",
        8 => "Homing pull-off failed to clear switch",
        9 => "Homing switch not found",
        _ => return None,
    };
    Some(cause)
}

/// Human-readable form of an error response
///
/// `None` is used for `error` lines that carry no numeric code.
pub fn describe_error(code: Option<u8>) -> String {
    match code {
        Some(code) => error_cause(code)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Unknown error {}", code)),
        None => "Unspecified error".to_string(),
    }
}

/// Human-readable form of an alarm
pub fn describe_alarm(code: u8) -> String {
    alarm_cause(code)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Unknown alarm {}", code))
}

/// Format as `error:N - cause`
pub fn format_error(code: u8) -> String {
    format!("error:{} - {}", code, describe_error(Some(code)))
}

/// Format as `ALARM:N - cause`
pub fn format_alarm(code: u8) -> String {
    format!("ALARM:{} - {}", code, describe_alarm(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes() {
        assert_eq!(error_cause(20), Some("Unsupported or invalid G-code command"));
        assert_eq!(error_cause(9), Some("G-code locked out during alarm or jog"));
        assert_eq!(alarm_cause(1), Some("Hard limit triggered, position lost"));
    }

    #[test]
    fn test_unknown_codes() {
        assert_eq!(error_cause(18), None);
        assert_eq!(error_cause(200), None);
        assert_eq!(describe_error(Some(200)), "Unknown error 200");
        assert_eq!(describe_error(None), "Unspecified error");
        assert_eq!(describe_alarm(42), "Unknown alarm 42");
    }

    #[test]
    fn test_formatting() {
        assert_eq!(format_error(22), "error:22 - Feed rate not set");
        assert_eq!(format_alarm(2), "ALARM:2 - Soft limit exceeded");
    }
}
