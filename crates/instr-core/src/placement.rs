//! Placement reconstruction
//!
//! Two independent algorithms:
//! - text centering: offset moving a freshly created text from its bottom-left
//!   insertion point to its center, read from the host bounding box
//! - dimension reconstruction: measurement frame plus anchors shifted onto the
//!   measurement line, with coincident anchors merged

use crate::config::CornerPolicy;
use crate::error::InstrError;
use crate::geometry::{
    checked_cross, checked_normalize, AnchorPoint, Frame, Point, Precision, Vector,
};
use crate::instruction::TextKind;
use glam::DVec3;

/// In-plane size of a text element
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extents {
    pub width: f64,
    pub height: f64,
}

/// Bounding box corner indices spanning width and height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CornerTable {
    pub width: (usize, usize),
    pub height: (usize, usize),
}

impl CornerTable {
    /// Ordering the host uses for 3d text volumes
    pub const TEXT_VOLUME: Self = Self {
        width: (5, 6),
        height: (6, 3),
    };

    /// Ordering the host uses for plain boxes
    pub const BOX: Self = Self {
        width: (0, 3),
        height: (3, 2),
    };

    /// Table for a text kind, if the host guarantees one
    #[must_use]
    pub const fn for_kind(kind: TextKind) -> Option<Self> {
        match kind {
            TextKind::Volume => Some(Self::TEXT_VOLUME),
            TextKind::Line | TextKind::Surface => None,
        }
    }

    fn extents(self, corners: &[Point]) -> Result<Extents, InstrError> {
        let corner = |i: usize| {
            corners.get(i).copied().ok_or_else(|| {
                InstrError::degenerate(format!(
                    "bounding box has {} corners, corner {i} required",
                    corners.len()
                ))
            })
        };
        Ok(Extents {
            width: corner(self.width.0)?.distance(corner(self.width.1)?),
            height: corner(self.height.0)?.distance(corner(self.height.1)?),
        })
    }
}

/// Width and height of a text element from its bounding box corners.
///
/// The heuristic measures the corner cloud along the frame's x and y axes and
/// takes the larger extent as the width. Texts in use are always wider than
/// tall; this is a placeholder policy, not a guarantee about the host's
/// corner ordering.
///
/// # Errors
/// `DegenerateGeometry` for an empty box or a table index the box lacks
pub fn text_extents(
    corners: &[Point],
    frame: &Frame,
    kind: TextKind,
    policy: CornerPolicy,
) -> Result<Extents, InstrError> {
    if corners.is_empty() {
        return Err(InstrError::degenerate("empty bounding box"));
    }
    if policy == CornerPolicy::Table {
        if let Some(table) = CornerTable::for_kind(kind) {
            return table.extents(corners);
        }
        tracing::debug!("No corner table for {kind} text, using extent heuristic");
    }

    let span = |axis: Vector| {
        let (min, max) = corners
            .iter()
            .map(|c| (*c - frame.origin()).dot(axis))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        max - min
    };
    let a = span(frame.xaxis());
    let b = span(frame.yaxis());
    Ok(Extents {
        width: a.max(b),
        height: a.min(b),
    })
}

/// Centering offset in local axes: half extents back along x and y, plus a
/// standoff along the normal
#[inline]
#[must_use]
pub fn centering_offset(extents: Extents, standoff: f64) -> Vector {
    DVec3::new(-0.5 * extents.width, -0.5 * extents.height, standoff)
}

/// World translation centering a text element on its insertion frame
///
/// # Errors
/// See [`text_extents`]
pub fn centering_translation(
    corners: &[Point],
    frame: &Frame,
    kind: TextKind,
    policy: CornerPolicy,
    standoff: f64,
) -> Result<Vector, InstrError> {
    let extents = text_extents(corners, frame, kind, policy)?;
    Ok(frame.to_world_vector(centering_offset(extents, standoff)))
}

/// One rendered leg of a dimension
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Run {
    pub start: Point,
    pub end: Point,
}

impl Run {
    #[inline]
    #[must_use]
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }
}

/// Reconstructed measurement frame and corrected anchors
#[derive(Debug, Clone, PartialEq)]
pub struct DimensionLayout {
    /// Frame with origin at the first corrected anchor
    pub frame: Frame,
    /// Anchors on the measurement line, coincident ones merged
    pub anchors: Vec<Point>,
}

impl DimensionLayout {
    /// Consecutive anchor pairs
    pub fn runs(&self) -> impl Iterator<Item = Run> + '_ {
        self.anchors
            .windows(2)
            .map(|pair| Run {
                start: pair[0],
                end: pair[1],
            })
    }

    /// Distance between first and last anchor
    #[must_use]
    pub fn length(&self) -> f64 {
        match (self.anchors.first(), self.anchors.last()) {
            (Some(first), Some(last)) => first.distance(*last),
            _ => 0.0,
        }
    }

    /// Unit vector from first to last anchor
    ///
    /// # Errors
    /// `DegenerateGeometry` if the dimension has zero length
    pub fn direction(&self) -> Result<Vector, InstrError> {
        let first = self.anchors.first().copied().unwrap_or_default();
        let last = self.anchors.last().copied().unwrap_or_default();
        checked_normalize(last - first, "dimension direction")
    }
}

/// Measurement frame: `z = -text_normal`, `y = unit(x × z)`
///
/// # Errors
/// `DegenerateGeometry` if `plane_xaxis` and the normal are parallel or zero
pub fn dimension_frame(
    origin: Point,
    plane_xaxis: Vector,
    text_normal: Vector,
) -> Result<Frame, InstrError> {
    let zaxis = -text_normal;
    let yaxis = checked_cross(plane_xaxis, zaxis)?.normalize();
    Frame::new(origin, plane_xaxis, yaxis)
}

/// Side of the measurement line an anchor sits on
fn shift_direction(anchor: &AnchorPoint, frame: &Frame) -> Vector {
    if anchor.direction.dot(frame.yaxis()) < 0.0 {
        -frame.yaxis()
    } else {
        frame.yaxis()
    }
}

/// Drop points closer than `tolerance` to the previously kept point
fn merge_coincident(points: impl IntoIterator<Item = Point>, tolerance: f64) -> Vec<Point> {
    let mut merged: Vec<Point> = Vec::new();
    for point in points {
        match merged.last() {
            Some(last) if last.distance(point) < tolerance => {}
            _ => merged.push(point),
        }
    }
    merged
}

/// Rebuild the measurement frame and shift every anchor onto the measurement line.
///
/// # Steps
/// 1. Frame from the first anchor, `plane_xaxis` and `text_normal`
/// 2. Each anchor moved along ±y by its distance, then projected onto the frame plane
/// 3. Anchors within `precision` of their predecessor merged away
///
/// # Errors
/// - `InvalidInstruction` with fewer than two anchors
/// - `DegenerateGeometry` for parallel axes or when every anchor merges into one
pub fn reconstruct_dimension(
    anchors: &[AnchorPoint],
    plane_xaxis: Vector,
    text_normal: Vector,
    precision: Precision,
) -> Result<DimensionLayout, InstrError> {
    let first = match anchors {
        [first, _, ..] => first,
        _ => {
            return Err(InstrError::InvalidInstruction(format!(
                "dimension needs at least 2 anchors, got {}",
                anchors.len()
            )))
        }
    };

    let reference = dimension_frame(first.location, plane_xaxis, text_normal)?;
    let corrected = anchors.iter().map(|anchor| {
        let shifted = anchor.location + shift_direction(anchor, &reference) * anchor.distance;
        reference.project(shifted)
    });
    let merged = merge_coincident(corrected, precision.tolerance());
    if merged.len() < 2 {
        return Err(InstrError::degenerate("all dimension anchors coincide"));
    }

    Ok(DimensionLayout {
        frame: reference.with_origin(merged[0]),
        anchors: merged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{HIGH_PRECISION, LOW_PRECISION};

    fn text_box(origin: Point, width: f64, height: f64, thickness: f64) -> Vec<Point> {
        // host ordering for text volumes: 5->6 spans width, 6->3 spans height
        let p = |x: f64, y: f64, z: f64| origin + DVec3::new(x, y, z);
        vec![
            p(0.0, 0.0, thickness),
            p(width, 0.0, thickness),
            p(width, height, thickness),
            p(width, height, 0.0),
            p(0.0, height, 0.0),
            p(0.0, 0.0, 0.0),
            p(width, 0.0, 0.0),
            p(0.0, height, thickness),
        ]
    }

    #[test]
    fn centering_moves_to_center_with_standoff() {
        let frame = Frame::world_xy();
        let corners = text_box(DVec3::ZERO, 40.0, 10.0, 5.0);
        let offset = centering_translation(
            &corners,
            &frame,
            TextKind::Volume,
            CornerPolicy::Heuristic,
            5.0,
        )
        .unwrap();
        let moved = frame.origin() + offset;
        assert_eq!(moved, DVec3::new(-20.0, -5.0, 5.0));
    }

    #[test]
    fn heuristic_ignores_corner_order() {
        let frame = Frame::world_xy();
        let mut corners = text_box(DVec3::new(3.0, 3.0, 0.0), 40.0, 10.0, 5.0);
        corners.reverse();
        let extents =
            text_extents(&corners, &frame, TextKind::Surface, CornerPolicy::Heuristic).unwrap();
        assert_eq!(extents, Extents { width: 40.0, height: 10.0 });
    }

    #[test]
    fn heuristic_assumes_width_is_larger() {
        let frame = Frame::world_xy();
        let corners = text_box(DVec3::ZERO, 10.0, 40.0, 5.0);
        let extents =
            text_extents(&corners, &frame, TextKind::Volume, CornerPolicy::Heuristic).unwrap();
        assert_eq!(extents.width, 40.0);
        assert_eq!(extents.height, 10.0);
    }

    #[test]
    fn table_policy_reads_fixed_corners() {
        let frame = Frame::world_xy();
        let corners = text_box(DVec3::ZERO, 10.0, 40.0, 5.0);
        let extents =
            text_extents(&corners, &frame, TextKind::Volume, CornerPolicy::Table).unwrap();
        assert_eq!(extents, Extents { width: 10.0, height: 40.0 });
    }

    #[test]
    fn table_policy_rejects_short_box() {
        let frame = Frame::world_xy();
        let corners = vec![DVec3::ZERO, DVec3::X, DVec3::Y];
        let err =
            text_extents(&corners, &frame, TextKind::Volume, CornerPolicy::Table).unwrap_err();
        assert!(err.is_geometry());
    }

    #[test]
    fn empty_box_is_degenerate() {
        let err = text_extents(&[], &Frame::world_xy(), TextKind::Line, CornerPolicy::Heuristic)
            .unwrap_err();
        assert!(err.is_geometry());
    }

    #[test]
    fn centering_follows_rotated_frame() {
        let frame = Frame::new(DVec3::ZERO, DVec3::Y, -DVec3::X).unwrap();
        let offset = frame.to_world_vector(centering_offset(
            Extents { width: 40.0, height: 10.0 },
            5.0,
        ));
        assert!((offset - DVec3::new(5.0, -20.0, 5.0)).length() < 1e-12);
    }

    #[test]
    fn dimension_frame_axes() {
        let frame = dimension_frame(DVec3::ZERO, DVec3::X, -DVec3::Z).unwrap();
        // z = +Z, y = X × Z = -Y
        assert!((frame.yaxis() + DVec3::Y).length() < 1e-12);
        assert!((frame.normal() + DVec3::Z).length() < 1e-12);
    }

    #[test]
    fn dimension_frame_rejects_parallel_normal() {
        let err = dimension_frame(DVec3::ZERO, DVec3::X, DVec3::new(2.0, 0.0, 0.0)).unwrap_err();
        assert!(err.is_geometry());
    }

    #[test]
    fn anchors_shift_onto_line() {
        let anchors = [
            AnchorPoint::new(DVec3::new(0.0, 0.0, 0.0), 20.0, -DVec3::Y),
            AnchorPoint::new(DVec3::new(100.0, 5.0, 3.0), 25.0, -DVec3::Y),
        ];
        let layout =
            reconstruct_dimension(&anchors, DVec3::X, -DVec3::Z, Precision::Medium).unwrap();
        // frame y is -Y; anchors point along -Y so shift along -Y as well
        assert_eq!(layout.anchors.len(), 2);
        assert!((layout.anchors[0] - DVec3::new(0.0, -20.0, 0.0)).length() < 1e-9);
        assert!((layout.anchors[1] - DVec3::new(100.0, -20.0, 0.0)).length() < 1e-9);
        assert_eq!(layout.frame.origin(), layout.anchors[0]);
        assert!((layout.length() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn anchors_on_other_side_shift_the_other_way() {
        let anchors = [
            AnchorPoint::new(DVec3::ZERO, 10.0, DVec3::Y),
            AnchorPoint::new(DVec3::new(50.0, 0.0, 0.0), 10.0, DVec3::Y),
        ];
        let layout =
            reconstruct_dimension(&anchors, DVec3::X, -DVec3::Z, Precision::Medium).unwrap();
        assert!((layout.anchors[0] - DVec3::new(0.0, 10.0, 0.0)).length() < 1e-9);
        assert!((layout.anchors[1] - DVec3::new(50.0, 10.0, 0.0)).length() < 1e-9);
    }

    #[test]
    fn close_anchors_merge_at_low_precision() {
        let anchors = [
            AnchorPoint::on_line(DVec3::ZERO),
            AnchorPoint::on_line(DVec3::new(0.05, 0.0, 0.0)),
            AnchorPoint::on_line(DVec3::new(60.0, 0.0, 0.0)),
        ];
        let low = reconstruct_dimension(&anchors, DVec3::X, DVec3::Z, Precision::Low).unwrap();
        assert_eq!(low.anchors.len(), 2);
        assert_eq!(low.runs().count(), 1);

        let high = reconstruct_dimension(&anchors, DVec3::X, DVec3::Z, Precision::High).unwrap();
        assert_eq!(high.anchors.len(), 3);
        assert!(LOW_PRECISION > 0.05 && HIGH_PRECISION < 0.05);
    }

    #[test]
    fn anchors_one_apart_survive_medium_precision() {
        let anchors = [
            AnchorPoint::on_line(DVec3::ZERO),
            AnchorPoint::on_line(DVec3::new(1.0, 0.0, 0.0)),
        ];
        let layout =
            reconstruct_dimension(&anchors, DVec3::X, DVec3::Z, Precision::Medium).unwrap();
        assert_eq!(layout.anchors.len(), 2);
        assert!((layout.direction().unwrap() - DVec3::X).length() < 1e-12);
    }

    #[test]
    fn collapsed_dimension_is_degenerate() {
        let anchors = [
            AnchorPoint::on_line(DVec3::ZERO),
            AnchorPoint::on_line(DVec3::new(0.01, 0.0, 0.0)),
        ];
        let err =
            reconstruct_dimension(&anchors, DVec3::X, DVec3::Z, Precision::Low).unwrap_err();
        assert!(err.is_geometry());
    }

    #[test]
    fn single_anchor_is_invalid() {
        let err = reconstruct_dimension(
            &[AnchorPoint::on_line(DVec3::ZERO)],
            DVec3::X,
            DVec3::Z,
            Precision::Medium,
        )
        .unwrap_err();
        assert!(matches!(err, InstrError::InvalidInstruction(_)));
    }
}
