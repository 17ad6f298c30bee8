//! GRBL status report parsing
//!
//! A status report is `<State|Field:values|...>`. The first field is the
//! state token; the rest are order-independent. Frames not present in a
//! report are derived from the ones that are, using `WPos = MPos - WCO`.

use grbllink_core::{Position, RunState};
use serde::{Deserialize, Serialize};

/// Planner and serial RX buffer availability (`Bf:` / `Buf:`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferRxState {
    /// Free planner blocks
    pub planner_blocks: u16,
    /// Free RX buffer bytes
    pub rx_bytes: u16,
}

impl BufferRxState {
    fn parse(value: &str) -> Option<Self> {
        let (blocks, bytes) = value.split_once([',', ':'])?;
        Some(Self {
            planner_blocks: blocks.trim().parse().ok()?,
            rx_bytes: bytes.trim().parse().ok()?,
        })
    }
}

/// One parsed status report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    /// State token as sent (`Hold:0`, `Door:1`, ...)
    pub state_token: String,
    /// Mapped state, `None` for tokens the link does not model
    pub state: Option<RunState>,
    /// `MPos:` field
    pub machine_pos: Option<Position>,
    /// `WPos:` field
    pub work_pos: Option<Position>,
    /// `WCO:` field
    pub work_offset: Option<Position>,
    /// Feed rate from `F:` or `FS:`
    pub feed_rate: Option<f64>,
    /// Spindle speed from `FS:`
    pub spindle_speed: Option<f64>,
    /// Buffer availability
    pub buffer: Option<BufferRxState>,
}

impl StatusReport {
    /// Parse a full `<...>` status line
    ///
    /// Returns `None` if the line is not bracketed or has no state token.
    /// Malformed fields are skipped rather than failing the report.
    pub fn parse(line: &str) -> Option<Self> {
        let inner = line.trim().strip_prefix('<')?.strip_suffix('>')?;
        let mut fields = inner.split('|');

        let state_token = fields.next()?.trim().to_string();
        if state_token.is_empty() {
            return None;
        }

        let mut report = StatusReport {
            state: RunState::from_report_token(&state_token),
            state_token,
            machine_pos: None,
            work_pos: None,
            work_offset: None,
            feed_rate: None,
            spindle_speed: None,
            buffer: None,
        };

        for field in fields {
            let Some((name, value)) = field.trim().split_once(':') else {
                continue;
            };
            match name {
                "MPos" => report.machine_pos = parse_position(value),
                "WPos" => report.work_pos = parse_position(value),
                "WCO" => report.work_offset = parse_position(value),
                "F" => report.feed_rate = value.trim().parse().ok(),
                "FS" => {
                    let mut parts = value.split(',');
                    report.feed_rate = parts.next().and_then(|v| v.trim().parse().ok());
                    report.spindle_speed = parts.next().and_then(|v| v.trim().parse().ok());
                }
                "Bf" | "Buf" => report.buffer = BufferRxState::parse(value),
                _ => {}
            }
        }

        Some(report)
    }

    /// Machine position, derived from `WPos + WCO` if not reported directly
    pub fn resolved_machine_pos(&self, known_offset: Position) -> Option<Position> {
        let offset = self.work_offset.unwrap_or(known_offset);
        self.machine_pos
            .or_else(|| self.work_pos.map(|wpos| machine_from_work(wpos, offset)))
    }

    /// Work position, derived from `MPos - WCO` if not reported directly
    pub fn resolved_work_pos(&self, known_offset: Position) -> Option<Position> {
        let offset = self.work_offset.unwrap_or(known_offset);
        self.work_pos
            .or_else(|| self.machine_pos.map(|mpos| work_from_machine(mpos, offset)))
    }
}

/// Parse `x,y,z[,a,...]`; extra axes are ignored
pub fn parse_position(value: &str) -> Option<Position> {
    let mut coords = value.split(',').map(|s| s.trim().parse::<f64>());
    let x = coords.next()?.ok()?;
    let y = coords.next()?.ok()?;
    let z = coords.next()?.ok()?;
    Some(Position::new(x, y, z))
}

/// `WPos = MPos - WCO`
pub fn work_from_machine(machine: Position, offset: Position) -> Position {
    machine - offset
}

/// `MPos = WPos + WCO`
pub fn machine_from_work(work: Position, offset: Position) -> Position {
    work + offset
}
