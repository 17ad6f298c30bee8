//! Modal state of the outbound G-code stream
//!
//! Tracks distance mode, motion mode, plane and the programmed position in
//! work coordinates as commands are sent. This is the position arcs are
//! computed from, so it follows what has been written, not what the
//! controller last reported.

use super::words::{Block, Word};
use grbllink_core::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DistanceMode {
    /// G90
    #[default]
    Absolute,
    /// G91
    Incremental,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionMode {
    /// G0
    #[default]
    Rapid,
    /// G1
    Linear,
    /// G2
    ArcClockwise,
    /// G3
    ArcCounterClockwise,
    /// G80 and motion modes the link does not model
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Plane {
    /// G17
    #[default]
    Xy,
    /// G18
    Zx,
    /// G19
    Yz,
}

/// An origin change carried by an outbound command
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OriginChange {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl OriginChange {
    /// Apply to a work position: named axes take the new value
    pub fn apply_to(&self, work: Position) -> Position {
        Position::new(
            self.x.unwrap_or(work.x),
            self.y.unwrap_or(work.y),
            self.z.unwrap_or(work.z),
        )
    }
}

/// `G10 L20` or `G92` with axis words; both redefine the current work position
pub fn origin_change(block: &Block) -> Option<OriginChange> {
    let is_g10_l20 = block.has_g(10.0) && block.value('L').is_some_and(|l| l == 20.0);
    if !is_g10_l20 && !block.has_g(92.0) {
        return None;
    }
    let change = OriginChange {
        x: block.value('X'),
        y: block.value('Y'),
        z: block.value('Z'),
    };
    if change == OriginChange::default() {
        return None;
    }
    Some(change)
}

/// Laser/spindle state change: `Some(true)` for M3/M4, `Some(false)` for M5
pub fn spindle_change(block: &Block) -> Option<bool> {
    if block.has_m(5.0) {
        Some(false)
    } else if block.has_m(3.0) || block.has_m(4.0) {
        Some(true)
    } else {
        None
    }
}

/// Modal state tracker
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModalTracker {
    distance: DistanceMode,
    motion: MotionMode,
    plane: Plane,
    position: Position,
}

impl ModalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn distance_mode(&self) -> DistanceMode {
        self.distance
    }

    pub fn motion_mode(&self) -> MotionMode {
        self.motion
    }

    pub fn plane(&self) -> Plane {
        self.plane
    }

    /// Programmed position in work coordinates
    pub fn position(&self) -> Position {
        self.position
    }

    /// Adopt a position reported by the controller
    pub fn sync_position(&mut self, position: Position) {
        self.position = position;
    }

    /// Controller defaults after a reset (G0 G17 G90), position kept
    pub fn reset_modes(&mut self) {
        self.distance = DistanceMode::Absolute;
        self.motion = MotionMode::Rapid;
        self.plane = Plane::Xy;
    }

    /// Modes and target a block would produce, without applying it
    pub fn preview(&self, block: &Block) -> Preview {
        let mut distance = self.distance;
        let mut motion = self.motion;
        let mut plane = self.plane;
        let mut non_modal_axes = false;

        for word in block.words.iter().filter(|w| w.letter == 'G') {
            match classify_g(word) {
                GWord::Motion(mode) => motion = mode,
                GWord::Distance(mode) => distance = mode,
                GWord::Plane(p) => plane = p,
                GWord::AxisConsumer => non_modal_axes = true,
                GWord::Ignored => {}
            }
        }

        let has_axes = block.has('X') || block.has('Y') || block.has('Z');
        let target = if let Some(change) = origin_change(block) {
            change.apply_to(self.position)
        } else if has_axes && !non_modal_axes {
            resolve_target(self.position, block, distance)
        } else {
            self.position
        };

        Preview {
            distance,
            motion,
            plane,
            target,
            moves: has_axes && !non_modal_axes && origin_change(block).is_none(),
        }
    }

    /// Apply a block that has been written to the controller
    pub fn apply_block(&mut self, block: &Block) {
        let preview = self.preview(block);
        self.distance = preview.distance;
        self.motion = preview.motion;
        self.plane = preview.plane;
        self.position = preview.target;
    }

    /// Apply a raw outbound line; jog lines move the position without
    /// touching the modal state, other `$` commands are ignored
    pub fn apply_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if let Some(jog) = trimmed.strip_prefix("$J=") {
            self.apply_jog(jog);
            return;
        }
        if trimmed.starts_with('$') {
            return;
        }
        match Block::parse(trimmed) {
            Ok(block) => self.apply_block(&block),
            Err(err) => tracing::debug!("modal tracking skipped: {}", err),
        }
    }

    fn apply_jog(&mut self, jog: &str) {
        let Ok(block) = Block::parse(jog) else {
            return;
        };
        if block.has_g(53.0) {
            return;
        }
        let distance = if block.has_g(91.0) {
            DistanceMode::Incremental
        } else if block.has_g(90.0) {
            DistanceMode::Absolute
        } else {
            self.distance
        };
        self.position = resolve_target(self.position, &block, distance);
    }
}

/// Result of previewing a block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preview {
    pub distance: DistanceMode,
    pub motion: MotionMode,
    pub plane: Plane,
    /// Position after the block
    pub target: Position,
    /// Whether the block carries a motion target
    pub moves: bool,
}

enum GWord {
    Motion(MotionMode),
    Distance(DistanceMode),
    Plane(Plane),
    /// Non-modal commands whose axis words are not a motion target
    AxisConsumer,
    Ignored,
}

fn classify_g(word: &Word) -> GWord {
    let code = (word.value * 10.0).round() as i64;
    match code {
        0 => GWord::Motion(MotionMode::Rapid),
        10 => GWord::Motion(MotionMode::Linear),
        20 => GWord::Motion(MotionMode::ArcClockwise),
        30 => GWord::Motion(MotionMode::ArcCounterClockwise),
        800 => GWord::Motion(MotionMode::Other),
        382..=385 => GWord::Motion(MotionMode::Other),
        900 => GWord::Distance(DistanceMode::Absolute),
        910 => GWord::Distance(DistanceMode::Incremental),
        170 => GWord::Plane(Plane::Xy),
        180 => GWord::Plane(Plane::Zx),
        190 => GWord::Plane(Plane::Yz),
        100 | 280 | 300 | 530 | 920 => GWord::AxisConsumer,
        _ => GWord::Ignored,
    }
}

fn resolve_target(start: Position, block: &Block, distance: DistanceMode) -> Position {
    let axis = |letter: char, current: f64| match (block.value(letter), distance) {
        (Some(v), DistanceMode::Absolute) => v,
        (Some(v), DistanceMode::Incremental) => current + v,
        (None, _) => current,
    };
    Position::new(
        axis('X', start.x),
        axis('Y', start.y),
        axis('Z', start.z),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(line: &str) -> Block {
        Block::parse(line).unwrap()
    }

    #[test]
    fn test_absolute_and_incremental_moves() {
        let mut modal = ModalTracker::new();
        modal.apply_line("G0 X10 Y5");
        assert_eq!(modal.position(), Position::new(10.0, 5.0, 0.0));

        modal.apply_line("G91 G1 X2 Y-1 F500");
        assert_eq!(modal.distance_mode(), DistanceMode::Incremental);
        assert_eq!(modal.motion_mode(), MotionMode::Linear);
        assert_eq!(modal.position(), Position::new(12.0, 4.0, 0.0));

        modal.apply_line("X1");
        assert_eq!(modal.position(), Position::new(13.0, 4.0, 0.0));

        modal.apply_line("G90 X0");
        assert_eq!(modal.position(), Position::new(0.0, 4.0, 0.0));
    }

    #[test]
    fn test_g92_sets_position() {
        let mut modal = ModalTracker::new();
        modal.apply_line("G0 X10 Y10 Z3");
        modal.apply_line("G92 X0 Y0");
        assert_eq!(modal.position(), Position::new(0.0, 0.0, 3.0));
        // G92 does not change the motion mode
        assert_eq!(modal.motion_mode(), MotionMode::Rapid);
    }

    #[test]
    fn test_g10_l20_and_g53() {
        let mut modal = ModalTracker::new();
        modal.apply_line("G1 X5 Y5");
        modal.apply_line("G10 L20 P1 X0 Y0 Z0");
        assert_eq!(modal.position(), Position::ZERO);

        modal.apply_line("G53 G0 X100");
        assert_eq!(modal.position(), Position::ZERO);
    }

    #[test]
    fn test_jog_moves_without_changing_modes() {
        let mut modal = ModalTracker::new();
        modal.apply_line("G0 X1 Y1");
        modal.apply_line("$J=G91 X10 F1000");
        assert_eq!(modal.position(), Position::new(11.0, 1.0, 0.0));
        assert_eq!(modal.distance_mode(), DistanceMode::Absolute);

        modal.apply_line("$H");
        assert_eq!(modal.position(), Position::new(11.0, 1.0, 0.0));
    }

    #[test]
    fn test_preview_does_not_mutate() {
        let mut modal = ModalTracker::new();
        modal.apply_line("G0 X3");
        let preview = modal.preview(&block("G2 X6 R1.5"));
        assert_eq!(preview.motion, MotionMode::ArcClockwise);
        assert_eq!(preview.target, Position::new(6.0, 0.0, 0.0));
        assert!(preview.moves);
        assert_eq!(modal.position(), Position::new(3.0, 0.0, 0.0));
        assert_eq!(modal.motion_mode(), MotionMode::Rapid);
    }

    #[test]
    fn test_origin_change_detection() {
        let change = origin_change(&block("G10 L20 P1 X0 Y0 Z0")).unwrap();
        assert_eq!(change.x, Some(0.0));
        assert!(origin_change(&block("G10 L2 P1 X0")).is_none());
        assert_eq!(origin_change(&block("G92 Z5")).unwrap().z, Some(5.0));
        assert!(origin_change(&block("G92.1")).is_none());
    }

    #[test]
    fn test_spindle_change() {
        assert_eq!(spindle_change(&block("M3 S1000")), Some(true));
        assert_eq!(spindle_change(&block("M4")), Some(true));
        assert_eq!(spindle_change(&block("M5")), Some(false));
        assert_eq!(spindle_change(&block("G1 X1")), None);
    }
}
