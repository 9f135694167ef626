//! Read-back of existing dimension elements

use crate::error::InstrError;
use crate::geometry::{AnchorPoint, Frame, Precision, Tolerance, Vector};
use crate::handle::ElementHandle;
use crate::host::HostApi;
use crate::placement::{dimension_frame, reconstruct_dimension, DimensionLayout};
use crate::tagger::InstructionTagger;
use std::fmt;

/// Snapshot of a dimension element as the host reports it.
///
/// Anchors are captured once at read time so two readings of the same
/// element taken before and after an edit can be compared.
#[derive(Debug, Clone)]
pub struct DimensionReading {
    pub handle: ElementHandle,
    /// Owning instruction, if the element is tagged
    pub correlation_id: Option<String>,
    /// Anchors exactly as stored by the host
    pub anchors: Vec<AnchorPoint>,
    pub text_normal: Vector,
    /// Measurement frame through the first stored anchor
    pub frame: Frame,
    /// Anchors shifted onto the measurement line
    pub layout: DimensionLayout,
}

impl DimensionReading {
    /// Distance between the first and last corrected anchor
    #[inline]
    #[must_use]
    pub fn length(&self) -> f64 {
        self.layout.length()
    }

    /// Same element with the same number of pairwise equal anchors (within the default tolerance)
    #[must_use]
    pub fn same_as(&self, other: &DimensionReading) -> bool {
        self.handle == other.handle
            && self.anchors.len() == other.anchors.len()
            && self
                .anchors
                .iter()
                .zip(&other.anchors)
                .all(|(a, b)| a.approx_eq(b, &Tolerance::DEFAULT))
    }
}

impl fmt::Display for DimensionReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dimension {} instruction:{} length:{:.0} anchors:{}",
            self.handle,
            self.correlation_id.as_deref().unwrap_or("-"),
            self.length(),
            self.anchors.len()
        )
    }
}

/// Read a dimension element back from the host
///
/// # Errors
/// - `HostCallFailed` if the host read or the tag read fails
/// - `InvalidInstruction` / `DegenerateGeometry` if the stored data cannot
///   produce a measurement frame
pub fn read_dimension(
    host: &dyn HostApi,
    tagger: &InstructionTagger,
    handle: ElementHandle,
    precision: Precision,
) -> Result<DimensionReading, InstrError> {
    let raw = host.dimension_data(handle)?;
    let anchors = raw.anchors()?;
    let layout = reconstruct_dimension(&anchors, raw.plane_xaxis, raw.plane_normal, precision)?;
    let frame = dimension_frame(anchors[0].location, raw.plane_xaxis, raw.plane_normal)?;
    let correlation_id = tagger.correlation_id_of(handle)?;

    tracing::debug!(
        "Read dimension {handle}: {} anchors, {} after merge",
        anchors.len(),
        layout.anchors.len()
    );

    Ok(DimensionReading {
        handle,
        correlation_id,
        anchors,
        text_normal: raw.plane_normal,
        frame,
        layout,
    })
}
