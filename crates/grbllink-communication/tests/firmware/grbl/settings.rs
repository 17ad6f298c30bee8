use grbllink_communication::firmware::grbl::settings::*;

#[test]
fn test_settings_store() {
    let mut settings = GrblSettings::new();
    assert!(settings.is_empty());

    settings.set(110, "5000.000");
    settings.set(HOMING_ENABLE, "1");
    settings.set(LASER_MODE, "0");

    assert_eq!(settings.len(), 3);
    assert_eq!(settings.get(110), Some("5000.000"));
    assert_eq!(settings.numeric(110), Some(5000.0));
    assert!(settings.homing_enabled());
    assert!(!settings.laser_mode());
}

#[test]
fn test_settings_dump_is_sorted() {
    let mut settings = GrblSettings::new();
    settings.set(130, "400.000");
    settings.set(22, "1");

    let dump = settings.to_string();
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines[0], "$22=1 (Homing cycle enable)");
    assert_eq!(lines[1], "$130=400.000 (X-axis max travel (mm))");
}

#[test]
fn test_setting_descriptions() {
    assert_eq!(describe_setting(32), Some("Laser-mode enable"));
    assert_eq!(describe_setting(999), None);
}

#[test]
fn test_clear() {
    let mut settings = GrblSettings::new();
    settings.set(HOMING_ENABLE, "1");
    settings.clear();
    assert!(!settings.homing_enabled());
}
