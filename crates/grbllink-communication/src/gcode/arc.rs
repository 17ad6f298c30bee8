//! Radius-format arc conversion
//!
//! Rewrites `G2/G3 ... R` blocks into center-offset (`I`/`J`) form before
//! they are sent. The center is solved the same way GRBL does it, so a
//! converted arc traces exactly what the controller would have traced:
//! a positive radius selects the arc of at most 180 degrees, a negative one
//! the arc of more than 180 degrees.

use super::modal::{ModalTracker, MotionMode, Plane};
use super::words::{format_number, Block};
use grbllink_core::GcodeError;

/// Rotation sense of an arc
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArcDirection {
    /// G2
    Clockwise,
    /// G3
    CounterClockwise,
}

/// Relative tolerance on `4r^2 - d^2` below zero that is still treated as
/// a half circle.
const HALF_CIRCLE_TOLERANCE: f64 = 1e-9;

/// Center offset `(i, j)` from `start` of the arc through `start` and `end`
///
/// `radius` carries the R word sign. When the chord equals the diameter
/// the center is the chord midpoint for either sign or direction.
pub fn center_offset(
    start: (f64, f64),
    end: (f64, f64),
    radius: f64,
    direction: ArcDirection,
) -> Result<(f64, f64), String> {
    let x = end.0 - start.0;
    let y = end.1 - start.1;
    let chord_sq = x * x + y * y;

    if chord_sq == 0.0 {
        return Err("endpoint equals start point".to_string());
    }
    if radius == 0.0 || !radius.is_finite() {
        return Err("radius must be non-zero".to_string());
    }

    let diameter_sq = 4.0 * radius * radius;
    let mut discriminant = diameter_sq - chord_sq;
    if discriminant < 0.0 {
        if discriminant < -HALF_CIRCLE_TOLERANCE * diameter_sq.max(1.0) {
            return Err(format!(
                "radius {} is too small for a chord of {}",
                format_number(radius.abs()),
                format_number(chord_sq.sqrt())
            ));
        }
        discriminant = 0.0;
    }

    // Distance from the chord midpoint to the center, scaled by 2/d.
    let mut h_x2_div_d = -discriminant.sqrt() / chord_sq.sqrt();
    if direction == ArcDirection::CounterClockwise {
        h_x2_div_d = -h_x2_div_d;
    }
    if radius < 0.0 {
        h_x2_div_d = -h_x2_div_d;
    }

    let i = 0.5 * (x - y * h_x2_div_d);
    let j = 0.5 * (y + x * h_x2_div_d);
    Ok((i, j))
}

/// Convert one outbound line if it is a radius-format arc in the XY plane
///
/// Returns `Ok(None)` when the line needs no rewriting. Arcs that cannot be
/// realized are rejected so they are never sent.
pub fn convert_radius_arc(line: &str, modal: &ModalTracker) -> Result<Option<String>, GcodeError> {
    let trimmed = line.trim();
    if trimmed.starts_with('$') {
        return Ok(None);
    }
    let Ok(block) = Block::parse(trimmed) else {
        return Ok(None);
    };

    let preview = modal.preview(&block);
    let direction = match preview.motion {
        MotionMode::ArcClockwise => ArcDirection::Clockwise,
        MotionMode::ArcCounterClockwise => ArcDirection::CounterClockwise,
        _ => return Ok(None),
    };

    let geometry_error = |reason: &str| GcodeError::ArcGeometry {
        line: trimmed.to_string(),
        reason: reason.to_string(),
    };

    // Arc motion is modal; a block without axis words and offsets is not an arc move.
    let has_offsets = block.has('I') || block.has('J') || block.has('K');
    let Some(radius_word) = block.word('R').cloned() else {
        if preview.moves && !has_offsets {
            return Err(geometry_error("arc has neither a radius nor center offsets"));
        }
        return Ok(None);
    };

    if has_offsets {
        return Err(geometry_error("arc has both a radius and center offsets"));
    }
    if preview.plane != Plane::Xy {
        tracing::debug!("radius arc outside G17 left for the controller: {}", trimmed);
        return Ok(None);
    }

    let start = modal.position();
    let target = preview.target;
    let (i, j) = center_offset(
        (start.x, start.y),
        (target.x, target.y),
        radius_word.value,
        direction,
    )
    .map_err(|reason| geometry_error(&reason))?;

    let converted = format!(
        "{} I{} J{}",
        block.without(&radius_word),
        format_number(i),
        format_number(j)
    );
    tracing::trace!(from = trimmed, to = %converted, "converted radius arc");
    Ok(Some(converted))
}
