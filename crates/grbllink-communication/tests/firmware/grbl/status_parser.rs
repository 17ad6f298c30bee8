use grbllink_communication::firmware::grbl::status_parser::*;
use grbllink_core::{Position, RunState};

#[test]
fn test_substate_tokens() {
    let report = StatusReport::parse("<Hold:0|MPos:1.000,2.000,3.000|FS:500,0>").unwrap();
    assert_eq!(report.state_token, "Hold:0");
    assert_eq!(report.state, Some(RunState::Hold));
    assert_eq!(report.feed_rate, Some(500.0));
    assert_eq!(report.spindle_speed, Some(0.0));
}

#[test]
fn test_fields_in_any_order() {
    let report = StatusReport::parse("<Idle|WCO:1.000,1.000,0.000|FS:0,0|MPos:2.000,3.000,0.000>").unwrap();
    assert_eq!(report.machine_pos, Some(Position::new(2.0, 3.0, 0.0)));
    assert_eq!(report.work_offset, Some(Position::new(1.0, 1.0, 0.0)));
    assert_eq!(
        report.resolved_work_pos(Position::ZERO),
        Some(Position::new(1.0, 2.0, 0.0))
    );
}

#[test]
fn test_derivation_uses_known_offset() {
    let report = StatusReport::parse("<Run|MPos:15.000,12.000,0.000>").unwrap();
    let offset = Position::new(10.0, 10.0, 0.0);
    assert_eq!(report.resolved_work_pos(offset), Some(Position::new(5.0, 2.0, 0.0)));
    assert_eq!(report.resolved_machine_pos(offset), Some(Position::new(15.0, 12.0, 0.0)));
}

#[test]
fn test_malformed_reports() {
    assert!(StatusReport::parse("Idle|MPos:0,0,0").is_none());
    assert!(StatusReport::parse("<>").is_none());

    let report = StatusReport::parse("<Idle|MPos:1,oops,3|WPos:0,0>").unwrap();
    assert_eq!(report.machine_pos, None);
    assert_eq!(report.work_pos, None);
}

#[test]
fn test_extra_axes_ignored() {
    assert_eq!(
        parse_position("1.0,2.0,3.0,4.0"),
        Some(Position::new(1.0, 2.0, 3.0))
    );
}
