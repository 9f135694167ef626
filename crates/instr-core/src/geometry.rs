//! Frames, tolerances and anchor points
//!
//! Vector algebra comes from `glam`; this module only adds the checked
//! operations the reconstruction code relies on. Near-zero cross products and
//! zero-length axes are rejected instead of normalized.

use crate::error::InstrError;
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Location in 3d space
pub type Point = DVec3;

/// Direction in 3d space
pub type Vector = DVec3;

/// Relative magnitude below which a cross product counts as zero
pub const DEGENERACY_EPSILON: f64 = 1e-9;

/// Merge tolerance for [`Precision::High`]
pub const HIGH_PRECISION: f64 = 1e-6;
/// Merge tolerance for [`Precision::Medium`]
pub const MEDIUM_PRECISION: f64 = 1e-3;
/// Merge tolerance for [`Precision::Low`]
pub const LOW_PRECISION: f64 = 0.1;

/// Tolerance tier used when merging dimension anchors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    High,
    #[default]
    Medium,
    Low,
}

impl Precision {
    /// Distance below which two points are the same point
    #[inline]
    #[must_use]
    pub const fn tolerance(self) -> f64 {
        match self {
            Precision::High => HIGH_PRECISION,
            Precision::Medium => MEDIUM_PRECISION,
            Precision::Low => LOW_PRECISION,
        }
    }
}

/// Absolute plus relative closeness test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    pub absolute: f64,
    pub relative: f64,
}

impl Tolerance {
    /// Millimetre tolerance used for anchor comparison
    pub const DEFAULT: Self = Self {
        absolute: 1e-3,
        relative: 1e-3,
    };

    /// `|a - b| <= absolute + relative * |b|`
    #[inline]
    #[must_use]
    pub fn is_close(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.absolute + self.relative * b.abs()
    }

    /// Component-wise [`Tolerance::is_close`]
    #[inline]
    #[must_use]
    pub fn is_allclose(&self, a: DVec3, b: DVec3) -> bool {
        self.is_close(a.x, b.x) && self.is_close(a.y, b.y) && self.is_close(a.z, b.z)
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Unit vector along `v`, or an error when `v` has no usable length
pub fn checked_normalize(v: Vector, what: &str) -> Result<Vector, InstrError> {
    let length = v.length();
    if !length.is_finite() || length <= f64::EPSILON {
        return Err(InstrError::degenerate(format!("zero-length {what}")));
    }
    Ok(v / length)
}

/// Cross product that rejects zero-length or parallel operands
pub fn checked_cross(a: Vector, b: Vector) -> Result<Vector, InstrError> {
    let scale = a.length() * b.length();
    if !scale.is_finite() || scale <= f64::EPSILON {
        return Err(InstrError::degenerate("cross product of zero-length vector"));
    }
    let c = a.cross(b);
    if c.length() <= DEGENERACY_EPSILON * scale {
        return Err(InstrError::degenerate("cross product of parallel vectors"));
    }
    Ok(c)
}

/// Closest point on the plane through `origin` with unit `normal`
#[inline]
#[must_use]
pub fn closest_point_on_plane(point: Point, origin: Point, normal: Vector) -> Point {
    point - normal * (point - origin).dot(normal)
}

/// Origin plus two orthonormal in-plane axes; the normal is `x × y`.
///
/// Construction re-orthogonalizes the axes, so a `Frame` value always holds
/// unit, mutually perpendicular axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FrameRepr", into = "FrameRepr")]
pub struct Frame {
    origin: Point,
    xaxis: Vector,
    yaxis: Vector,
}

impl Frame {
    /// Build a frame, re-orthogonalizing `yaxis` against `xaxis`
    ///
    /// # Errors
    /// `DegenerateGeometry` if either axis has zero length or they are parallel
    pub fn new(origin: Point, xaxis: Vector, yaxis: Vector) -> Result<Self, InstrError> {
        let x = checked_normalize(xaxis, "x-axis")?;
        checked_cross(x, yaxis)?;
        let y = checked_normalize(yaxis - x * yaxis.dot(x), "y-axis")?;
        Ok(Self {
            origin,
            xaxis: x,
            yaxis: y,
        })
    }

    /// World XY frame at the origin
    #[must_use]
    pub const fn world_xy() -> Self {
        Self {
            origin: DVec3::ZERO,
            xaxis: DVec3::X,
            yaxis: DVec3::Y,
        }
    }

    #[inline]
    #[must_use]
    pub fn origin(&self) -> Point {
        self.origin
    }

    #[inline]
    #[must_use]
    pub fn xaxis(&self) -> Vector {
        self.xaxis
    }

    #[inline]
    #[must_use]
    pub fn yaxis(&self) -> Vector {
        self.yaxis
    }

    /// Implicit z-axis
    #[inline]
    #[must_use]
    pub fn normal(&self) -> Vector {
        self.xaxis.cross(self.yaxis)
    }

    /// Same axes, different origin
    #[inline]
    #[must_use]
    pub fn with_origin(self, origin: Point) -> Self {
        Self { origin, ..self }
    }

    /// Express a local-axis vector in world coordinates
    #[inline]
    #[must_use]
    pub fn to_world_vector(&self, local: Vector) -> Vector {
        self.xaxis * local.x + self.yaxis * local.y + self.normal() * local.z
    }

    /// Express a world vector in local-axis coordinates
    #[inline]
    #[must_use]
    pub fn to_local_vector(&self, world: Vector) -> Vector {
        DVec3::new(
            world.dot(self.xaxis),
            world.dot(self.yaxis),
            world.dot(self.normal()),
        )
    }

    /// Map a world point expressed relative to this frame into `target`
    #[inline]
    #[must_use]
    pub fn transfer_point(&self, point: Point, target: &Frame) -> Point {
        target.origin + target.to_world_vector(self.to_local_vector(point - self.origin))
    }

    /// Closest point on this frame's plane
    #[inline]
    #[must_use]
    pub fn project(&self, point: Point) -> Point {
        closest_point_on_plane(point, self.origin, self.normal())
    }

    /// Check axis invariants within `tolerance`
    #[must_use]
    pub fn is_orthonormal(&self, tolerance: f64) -> bool {
        (self.xaxis.length() - 1.0).abs() <= tolerance
            && (self.yaxis.length() - 1.0).abs() <= tolerance
            && self.xaxis.dot(self.yaxis).abs() <= tolerance
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::world_xy()
    }
}

#[derive(Serialize, Deserialize)]
struct FrameRepr {
    origin: Point,
    xaxis: Vector,
    yaxis: Vector,
}

impl TryFrom<FrameRepr> for Frame {
    type Error = InstrError;

    fn try_from(repr: FrameRepr) -> Result<Self, Self::Error> {
        Frame::new(repr.origin, repr.xaxis, repr.yaxis)
    }
}

impl From<Frame> for FrameRepr {
    fn from(frame: Frame) -> Self {
        Self {
            origin: frame.origin,
            xaxis: frame.xaxis,
            yaxis: frame.yaxis,
        }
    }
}

/// One control point of a multi-segment dimension.
///
/// Equality is tolerance based; see [`AnchorPoint::approx_eq`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnchorPoint {
    /// Location in 3d space
    pub location: Point,
    /// Signed distance from the measurement line
    pub distance: f64,
    /// Direction from the measurement line towards the anchor
    pub direction: Vector,
}

impl AnchorPoint {
    #[inline]
    #[must_use]
    pub fn new(location: Point, distance: f64, direction: Vector) -> Self {
        Self {
            location,
            distance,
            direction,
        }
    }

    /// Anchor lying on the measurement line
    #[inline]
    #[must_use]
    pub fn on_line(location: Point) -> Self {
        Self::new(location, 0.0, DVec3::ZERO)
    }

    /// Compare location, direction and distance within `tolerance`
    #[must_use]
    pub fn approx_eq(&self, other: &AnchorPoint, tolerance: &Tolerance) -> bool {
        tolerance.is_allclose(self.location, other.location)
            && tolerance.is_allclose(self.direction, other.direction)
            && tolerance.is_close(self.distance, other.distance)
    }
}
