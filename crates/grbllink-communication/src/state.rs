//! Mirrored controller state
//!
//! Holds the last reported run state and the three position frames. All
//! frames of one status report are computed first and assigned together, so
//! a snapshot never mixes values from two reports.

use crate::firmware::grbl::status_parser::work_from_machine;
use crate::firmware::grbl::StatusReport;
use crate::gcode::OriginChange;
use grbllink_core::{LinkEvent, Position, RunState};

/// Positions closer than this are treated as unchanged
const POSITION_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateTracker {
    state: RunState,
    machine: Position,
    work: Position,
    offset: Position,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn machine_pos(&self) -> Position {
        self.machine
    }

    pub fn work_pos(&self) -> Position {
        self.work
    }

    pub fn work_offset(&self) -> Position {
        self.offset
    }

    /// Fold a status report into the mirror
    ///
    /// Returns the events the change produces: `StateChanged` when the run
    /// state moved, `PositionChanged` when any frame moved.
    pub fn apply_status(&mut self, report: &StatusReport) -> Vec<LinkEvent> {
        let mut events = Vec::new();

        match report.state {
            Some(state) => {
                if let Some(event) = self.set_state(state) {
                    events.push(event);
                }
            }
            None => tracing::warn!(token = %report.state_token, "unknown run state in status report"),
        }

        let resolved = (
            report.resolved_machine_pos(self.offset),
            report.resolved_work_pos(self.offset),
        );
        let (machine, work, offset) = match resolved {
            // Without `WCO` both frames pin the offset down.
            (Some(machine), Some(work)) => (
                machine,
                work,
                report.work_offset.unwrap_or(machine - work),
            ),
            _ => {
                let offset = report.work_offset.unwrap_or(self.offset);
                (self.machine, work_from_machine(self.machine, offset), offset)
            }
        };

        let moved = !same(machine, self.machine) || !same(work, self.work);
        self.machine = machine;
        self.work = work;
        self.offset = offset;

        if moved {
            events.push(LinkEvent::PositionChanged { machine, work });
        }
        events
    }

    /// Local transition; `Some` event when the state actually changed
    pub fn set_state(&mut self, state: RunState) -> Option<LinkEvent> {
        if self.state == state {
            return None;
        }
        tracing::debug!(from = %self.state, to = %state, "run state changed");
        self.state = state;
        Some(LinkEvent::StateChanged(state))
    }

    /// An acknowledged `G10 L20` / `G92` redefined the work position
    ///
    /// The machine position is unchanged, so the offset absorbs the change.
    pub fn apply_origin(&mut self, change: &OriginChange) -> LinkEvent {
        self.work = change.apply_to(self.work);
        self.offset = self.machine - self.work;
        LinkEvent::PositionChanged {
            machine: self.machine,
            work: self.work,
        }
    }

    /// Positions are kept as last known; a reconnect replaces them
    pub fn set_disconnected(&mut self) -> Option<LinkEvent> {
        self.set_state(RunState::Disconnected)
    }
}

fn same(a: Position, b: Position) -> bool {
    (a.x - b.x).abs() < POSITION_EPSILON
        && (a.y - b.y).abs() < POSITION_EPSILON
        && (a.z - b.z).abs() < POSITION_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(line: &str) -> StatusReport {
        StatusReport::parse(line).unwrap()
    }

    fn assert_close(actual: Position, expected: Position) {
        assert!(same(actual, expected), "{} != {}", actual, expected);
    }

    #[test]
    fn test_both_frames_derive_offset() {
        let mut tracker = StateTracker::new();
        let events =
            tracker.apply_status(&report("<Idle|MPos:1.000,2.000,3.000|WPos:0.500,1.500,2.500>"));

        assert_eq!(tracker.state(), RunState::Idle);
        assert_close(tracker.machine_pos(), Position::new(1.0, 2.0, 3.0));
        assert_close(tracker.work_pos(), Position::new(0.5, 1.5, 2.5));
        assert_close(tracker.work_offset(), Position::new(0.5, 0.5, 0.5));
        assert_eq!(events[0], LinkEvent::StateChanged(RunState::Idle));
        assert!(matches!(events[1], LinkEvent::PositionChanged { .. }));
    }

    #[test]
    fn test_machine_only_uses_known_offset() {
        let mut tracker = StateTracker::new();
        tracker.apply_status(&report("<Idle|MPos:0,0,0|WCO:10.000,10.000,0.000>"));
        tracker.apply_status(&report("<Run|MPos:25.000,12.500,-1.000>"));

        assert_eq!(tracker.work_pos(), Position::new(15.0, 2.5, -1.0));
        assert_eq!(tracker.work_offset(), Position::new(10.0, 10.0, 0.0));
    }

    #[test]
    fn test_work_only_derives_machine() {
        let mut tracker = StateTracker::new();
        tracker.apply_status(&report("<Idle|WPos:0,0,0|WCO:5.000,0.000,0.000>"));
        assert_close(tracker.machine_pos(), Position::new(5.0, 0.0, 0.0));

        tracker.apply_status(&report("<Jog|WPos:1.000,1.000,0.000>"));
        assert_close(tracker.machine_pos(), Position::new(6.0, 1.0, 0.0));
        assert_eq!(tracker.state(), RunState::Jog);
    }

    #[test]
    fn test_offset_only_report_rederives_work() {
        let mut tracker = StateTracker::new();
        tracker.apply_status(&report("<Idle|MPos:10.000,0.000,0.000>"));
        tracker.apply_status(&report("<Idle|WCO:4.000,0.000,0.000>"));
        assert_close(tracker.work_pos(), Position::new(6.0, 0.0, 0.0));
    }

    #[test]
    fn test_unchanged_report_is_silent() {
        let mut tracker = StateTracker::new();
        tracker.apply_status(&report("<Idle|MPos:1.000,0.000,0.000>"));
        let events = tracker.apply_status(&report("<Idle|MPos:1.000,0.000,0.000>"));
        assert!(events.is_empty());
    }

    #[test]
    fn test_unknown_state_keeps_previous() {
        let mut tracker = StateTracker::new();
        tracker.apply_status(&report("<Idle|MPos:0,0,0>"));
        tracker.apply_status(&report("<Sleep|MPos:0,0,0>"));
        assert_eq!(tracker.state(), RunState::Idle);
    }

    #[test]
    fn test_origin_change_moves_offset() {
        let mut tracker = StateTracker::new();
        tracker.apply_status(&report("<Idle|MPos:7.000,3.000,-2.000>"));
        tracker.apply_origin(&OriginChange {
            x: Some(0.0),
            y: Some(0.0),
            z: None,
        });

        assert_close(tracker.work_pos(), Position::new(0.0, 0.0, -2.0));
        assert_close(tracker.work_offset(), Position::new(7.0, 3.0, 0.0));
        assert_close(tracker.machine_pos(), Position::new(7.0, 3.0, -2.0));
    }

    #[test]
    fn test_set_state_reports_changes_only() {
        let mut tracker = StateTracker::new();
        assert_eq!(tracker.set_state(RunState::Disconnected), None);
        assert_eq!(
            tracker.set_state(RunState::Connecting),
            Some(LinkEvent::StateChanged(RunState::Connecting))
        );
        assert!(tracker.set_disconnected().is_some());
    }
}
