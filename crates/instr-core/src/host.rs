//! Host capability surface
//!
//! The CAD host owns every element; this crate only ever holds handles and
//! talks to the host through [`HostApi`]. All calls are synchronous and may fail.

use crate::error::HostError;
use crate::geometry::{AnchorPoint, Frame, Point, Vector};
use crate::handle::ElementHandle;
use crate::instruction::TextKind;
use crate::InstrError;
use std::collections::BTreeSet;
use std::path::Path;

/// Optional host features, resolved once when a component is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCapabilities {
    /// Host can force re-materialization of existing elements
    pub supports_recreate: bool,
    /// Host can delete a user attribute (otherwise it is blanked)
    pub supports_attribute_removal: bool,
}

impl Default for HostCapabilities {
    fn default() -> Self {
        Self {
            supports_recreate: true,
            supports_attribute_removal: true,
        }
    }
}

/// Text creation options
#[derive(Debug, Clone, PartialEq)]
pub struct TextOptions {
    pub text: String,
    pub height: f64,
    pub thickness: f64,
    pub kind: TextKind,
    pub color: u32,
}

/// Raw dimension data as stored by the host
#[derive(Debug, Clone, PartialEq)]
pub struct RawDimension {
    /// Anchor locations, in segment order
    pub points: Vec<Point>,
    /// Per-anchor distance from the measurement line
    pub distances: Vec<f64>,
    /// Per-anchor direction from the measurement line
    pub directions: Vec<Vector>,
    /// Text plane normal
    pub plane_normal: Vector,
    /// Text plane x-axis (measuring direction)
    pub plane_xaxis: Vector,
}

impl RawDimension {
    /// Zip the per-anchor arrays into anchor points
    ///
    /// # Errors
    /// `InvalidInstruction` if the arrays disagree in length
    pub fn anchors(&self) -> Result<Vec<AnchorPoint>, InstrError> {
        if self.points.len() != self.distances.len() || self.points.len() != self.directions.len()
        {
            return Err(InstrError::InvalidInstruction(format!(
                "dimension has {} points, {} distances, {} directions",
                self.points.len(),
                self.distances.len(),
                self.directions.len()
            )));
        }
        Ok(self
            .points
            .iter()
            .zip(&self.distances)
            .zip(&self.directions)
            .map(|((point, distance), direction)| AnchorPoint::new(*point, *distance, *direction))
            .collect())
    }
}

/// CAD host element API
pub trait HostApi: Send + Sync {
    /// Feature flags; read once at component construction
    fn capabilities(&self) -> HostCapabilities {
        HostCapabilities::default()
    }

    fn create_text(
        &self,
        origin: Point,
        xaxis: Vector,
        yaxis: Vector,
        options: &TextOptions,
    ) -> Result<ElementHandle, HostError>;

    fn create_dimension(
        &self,
        direction: Vector,
        text_plane_normal: Vector,
        text_plane_origin: Point,
        anchor_points: &[Point],
    ) -> Result<ElementHandle, HostError>;

    fn import_light_model(&self, path: &Path, origin: Point) -> Result<ElementHandle, HostError>;

    /// Re-frame elements from `from` to `to`
    fn apply_transform(
        &self,
        handles: &[ElementHandle],
        from: &Frame,
        to: &Frame,
    ) -> Result<(), HostError>;

    fn move_elements(&self, handles: &[ElementHandle], translation: Vector)
        -> Result<(), HostError>;

    /// Batched delete; may report a partial failure
    fn delete(&self, handles: &[ElementHandle]) -> Result<(), HostError>;

    /// Force re-materialization of elements added while auto-refresh was off
    fn recreate(&self, handles: &[ElementHandle]) -> Result<(), HostError>;

    /// Viewport refresh; never fails
    fn refresh(&self);

    /// Bounding box corners of `handle` in the local space of `relative_to`
    fn bounding_box_local(
        &self,
        handle: ElementHandle,
        relative_to: &[ElementHandle],
    ) -> Result<Vec<Point>, HostError>;

    fn set_attribute(
        &self,
        handles: &[ElementHandle],
        key: u32,
        value: &str,
    ) -> Result<(), HostError>;

    fn get_attribute(&self, handle: ElementHandle, key: u32) -> Result<Option<String>, HostError>;

    /// Only called when [`HostCapabilities::supports_attribute_removal`] is set
    fn remove_attribute(&self, handles: &[ElementHandle], key: u32) -> Result<(), HostError>;

    fn list_element_ids(&self) -> Result<BTreeSet<ElementHandle>, HostError>;

    fn dimension_data(&self, handle: ElementHandle) -> Result<RawDimension, HostError>;
}

/// Key-value store embedded in the host project file
pub trait ProjectDataStore: Send + Sync {
    fn set_project_data(&self, key: &str, value: &str) -> Result<(), HostError>;

    fn get_project_data(&self, key: &str) -> Result<Option<String>, HostError>;
}
