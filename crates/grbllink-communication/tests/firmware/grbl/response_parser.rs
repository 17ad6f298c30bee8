use grbllink_communication::firmware::grbl::response_parser::*;
use grbllink_core::{Position, RunState};

#[test]
fn test_parse_ok() {
    assert_eq!(GrblResponse::parse("ok"), Some(GrblResponse::Ok));
    assert_eq!(GrblResponse::parse("  OK\r"), Some(GrblResponse::Ok));
}

#[test]
fn test_parse_error() {
    assert_eq!(GrblResponse::parse("error:1"), Some(GrblResponse::Error(Some(1))));
    assert_eq!(GrblResponse::parse("error:23"), Some(GrblResponse::Error(Some(23))));
    assert_eq!(
        GrblResponse::parse("error: Bad number format"),
        Some(GrblResponse::Error(None))
    );
}

#[test]
fn test_parse_alarm() {
    assert_eq!(GrblResponse::parse("ALARM:1"), Some(GrblResponse::Alarm(1)));
    assert_eq!(GrblResponse::parse("alarm:6"), Some(GrblResponse::Alarm(6)));
}

#[test]
fn test_parse_status_report() {
    let response = GrblResponse::parse("<Idle|MPos:0.000,0.000,0.000|WPos:0.000,0.000,0.000>");

    assert!(matches!(response, Some(GrblResponse::Status(_))));

    if let Some(GrblResponse::Status(status)) = response {
        assert_eq!(status.state, Some(RunState::Idle));
        assert_eq!(status.machine_pos, Some(Position::ZERO));
        assert_eq!(status.work_pos, Some(Position::ZERO));
    }
}

#[test]
fn test_parse_status_with_buffer() {
    let response = GrblResponse::parse("<Run|MPos:10.000,5.000,2.500|Bf:15,128>");

    if let Some(GrblResponse::Status(status)) = response {
        assert_eq!(status.state, Some(RunState::Run));
        let buffer = status.buffer.unwrap();
        assert_eq!(buffer.planner_blocks, 15);
        assert_eq!(buffer.rx_bytes, 128);
    } else {
        panic!("expected a status report");
    }
}

#[test]
fn test_parse_setting() {
    assert_eq!(
        GrblResponse::parse("$110=5000.000"),
        Some(GrblResponse::Setting {
            number: 110,
            value: "5000.000".to_string()
        })
    );
}

#[test]
fn test_parse_banner() {
    assert!(matches!(
        GrblResponse::parse("Grbl 1.1h ['$' for help]"),
        Some(GrblResponse::Welcome(_))
    ));
}

#[test]
fn test_feedback_is_not_an_error() {
    assert_eq!(
        GrblResponse::parse("[MSG:Reset to continue]"),
        Some(GrblResponse::Other("[MSG:Reset to continue]".to_string()))
    );
    assert!(!GrblResponse::parse("[MSG:error in line]").unwrap().frees_slot());
}

#[test]
fn test_blank_lines_are_skipped() {
    assert_eq!(GrblResponse::parse(""), None);
    assert_eq!(GrblResponse::parse("  \r"), None);
}

#[test]
fn test_acknowledgements_free_slots() {
    assert!(GrblResponse::Ok.frees_slot());
    assert!(GrblResponse::Error(Some(9)).frees_slot());
    assert!(!GrblResponse::Alarm(1).frees_slot());
    assert!(!GrblResponse::Other("hello".to_string()).frees_slot());
}
