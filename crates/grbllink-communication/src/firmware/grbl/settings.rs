//! Controller settings read back with `$$`

use std::collections::BTreeMap;
use std::fmt;

/// `$22` homing cycle enable
pub const HOMING_ENABLE: u16 = 22;
/// `$32` laser mode enable
pub const LASER_MODE: u16 = 32;

/// Description of a GRBL 1.1 setting number
pub fn describe_setting(number: u16) -> Option<&'static str> {
    let description = match number {
        0 => "Step pulse time (microseconds)",
        1 => "Step idle delay (milliseconds)",
        2 => "Step pulse invert (mask)",
        3 => "Step direction invert (mask)",
        4 => "Invert step enable pin",
        5 => "Invert limit pins",
        6 => "Invert probe pin",
        10 => "Status report options",
        11 => "Junction deviation (mm)",
        12 => "Arc tolerance (mm)",
        13 => "Report in inches",
        20 => "Soft limits enable",
        21 => "Hard limits enable",
        22 => "Homing cycle enable",
        23 => "Homing direction invert (mask)",
        24 => "Homing locate feed rate (mm/min)",
        25 => "Homing search seek rate (mm/min)",
        26 => "Homing switch debounce delay (ms)",
        27 => "Homing switch pull-off distance (mm)",
        30 => "Maximum spindle speed (RPM)",
        31 => "Minimum spindle speed (RPM)",
        32 => "Laser-mode enable",
        100 => "X-axis steps per mm",
        101 => "Y-axis steps per mm",
        102 => "Z-axis steps per mm",
        110 => "X-axis max rate (mm/min)",
        111 => "Y-axis max rate (mm/min)",
        112 => "Z-axis max rate (mm/min)",
        120 => "X-axis acceleration (mm/sec^2)",
        121 => "Y-axis acceleration (mm/sec^2)",
        122 => "Z-axis acceleration (mm/sec^2)",
        130 => "X-axis max travel (mm)",
        131 => "Y-axis max travel (mm)",
        132 => "Z-axis max travel (mm)",
        _ => return None,
    };
    Some(description)
}

/// Last value reported for each setting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GrblSettings {
    values: BTreeMap<u16, String>,
}

impl GrblSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a readback; returns the previous value if it changed
    pub fn set(&mut self, number: u16, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        match self.values.insert(number, value.clone()) {
            Some(previous) if previous != value => Some(previous),
            _ => None,
        }
    }

    pub fn get(&self, number: u16) -> Option<&str> {
        self.values.get(&number).map(String::as_str)
    }

    /// Value parsed as a number
    pub fn numeric(&self, number: u16) -> Option<f64> {
        self.get(number).and_then(|v| v.parse().ok())
    }

    /// Boolean settings are `0`/`1`; unknown means disabled
    pub fn flag(&self, number: u16) -> bool {
        self.numeric(number).is_some_and(|v| v != 0.0)
    }

    /// `$22`; `false` until the controller has reported it
    pub fn homing_enabled(&self) -> bool {
        self.flag(HOMING_ENABLE)
    }

    /// `$32`
    pub fn laser_mode(&self) -> bool {
        self.flag(LASER_MODE)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Settings in ascending number order
    pub fn iter(&self) -> impl Iterator<Item = (u16, &str)> {
        self.values.iter().map(|(n, v)| (*n, v.as_str()))
    }
}

impl fmt::Display for GrblSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (number, value) in self.iter() {
            let description = describe_setting(number).unwrap_or("Unknown setting");
            writeln!(f, "${}={} ({})", number, value, description)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_homing_flag_tracks_readback() {
        let mut settings = GrblSettings::new();
        assert!(!settings.homing_enabled());

        settings.set(HOMING_ENABLE, "1");
        assert!(settings.homing_enabled());

        assert_eq!(settings.set(HOMING_ENABLE, "0"), Some("1".to_string()));
        assert!(!settings.homing_enabled());
    }

    #[test]
    fn test_set_reports_only_changes() {
        let mut settings = GrblSettings::new();
        assert_eq!(settings.set(110, "5000.000"), None);
        assert_eq!(settings.set(110, "5000.000"), None);
        assert_eq!(settings.numeric(110), Some(5000.0));
        assert_eq!(settings.len(), 1);
    }

    #[test]
    fn test_display_lists_in_order() {
        let mut settings = GrblSettings::new();
        settings.set(132, "200.000");
        settings.set(0, "10");
        settings.set(999, "x");
        let text = settings.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "$0=10 (Step pulse time (microseconds))");
        assert_eq!(lines[1], "$132=200.000 (Z-axis max travel (mm))");
        assert_eq!(lines[2], "$999=x (Unknown setting)");
    }
}
