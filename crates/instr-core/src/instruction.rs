//! Instruction values
//!
//! A closed set of drawable instruction kinds. Each carries the correlation id
//! that ends up in the ownership tag of the element it produces.

use crate::error::InstrError;
use crate::geometry::{AnchorPoint, Frame};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Generate a fresh correlation id
#[must_use]
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Host geometry used to materialize text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextKind {
    Line,
    Surface,
    Volume,
}

impl TextKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TextKind::Line => "line",
            TextKind::Surface => "surface",
            TextKind::Volume => "volume",
        }
    }
}

impl FromStr for TextKind {
    type Err = InstrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "line" => Ok(TextKind::Line),
            "surface" => Ok(TextKind::Surface),
            "volume" => Ok(TextKind::Volume),
            other => Err(InstrError::UnsupportedInstructionKind(format!(
                "text geometry '{other}'"
            ))),
        }
    }
}

impl fmt::Display for TextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Annotation text placed in a frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextInstruction {
    #[serde(default = "new_correlation_id")]
    pub id: String,
    pub text: String,
    pub location: Frame,
    /// Text height
    pub size: f64,
    pub thickness: f64,
    /// Host geometry kind name, checked against [`TextKind`] before any host call
    pub geometry_kind: String,
    /// Shift the text so `location` ends up at its center
    pub centered: bool,
}

impl TextInstruction {
    /// Volume text of height 100 and thickness 5, centered on `location`
    #[must_use]
    pub fn new(text: impl Into<String>, location: Frame) -> Self {
        Self {
            id: new_correlation_id(),
            text: text.into(),
            location,
            size: 100.0,
            thickness: 5.0,
            geometry_kind: TextKind::Volume.as_str().to_string(),
            centered: true,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_thickness(mut self, thickness: f64) -> Self {
        self.thickness = thickness;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_geometry_kind(mut self, kind: impl Into<String>) -> Self {
        self.geometry_kind = kind.into();
        self
    }

    #[inline]
    #[must_use]
    pub fn with_centered(mut self, centered: bool) -> Self {
        self.centered = centered;
        self
    }

    /// Resolve and sanity check the text parameters
    ///
    /// # Errors
    /// - `UnsupportedInstructionKind` for an unknown geometry kind
    /// - `InvalidInstruction` for empty text or non-positive size
    pub fn validate(&self) -> Result<TextKind, InstrError> {
        let kind = self.geometry_kind.parse::<TextKind>()?;
        if self.text.is_empty() {
            return Err(InstrError::InvalidInstruction("empty text".to_string()));
        }
        if !(self.size.is_finite() && self.size > 0.0) {
            return Err(InstrError::InvalidInstruction(format!(
                "text size must be positive, got {}",
                self.size
            )));
        }
        if !(self.thickness.is_finite() && self.thickness >= 0.0) {
            return Err(InstrError::InvalidInstruction(format!(
                "text thickness must be non-negative, got {}",
                self.thickness
            )));
        }
        Ok(kind)
    }
}

/// Multi-segment linear dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionInstruction {
    #[serde(default = "new_correlation_id")]
    pub id: String,
    pub anchors: Vec<AnchorPoint>,
    /// Measurement plane; its x-axis is the measuring direction
    pub location: Frame,
}

impl DimensionInstruction {
    #[must_use]
    pub fn new(anchors: Vec<AnchorPoint>, location: Frame) -> Self {
        Self {
            id: new_correlation_id(),
            anchors,
            location,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Lightweight 3d reference model, imported then re-framed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInstruction {
    #[serde(default = "new_correlation_id")]
    pub id: String,
    pub source_path: PathBuf,
    /// Frame the model file is authored in
    pub location: Frame,
    /// Frame the model should end up in
    pub target_location: Frame,
}

impl ModelInstruction {
    #[must_use]
    pub fn new(source_path: impl Into<PathBuf>, location: Frame, target_location: Frame) -> Self {
        Self {
            id: new_correlation_id(),
            source_path: source_path.into(),
            location,
            target_location,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Any drawable instruction
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instruction {
    Text(TextInstruction),
    Dimension(DimensionInstruction),
    Model(ModelInstruction),
}

impl Instruction {
    /// Correlation id written into the ownership tag
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Instruction::Text(t) => &t.id,
            Instruction::Dimension(d) => &d.id,
            Instruction::Model(m) => &m.id,
        }
    }

    #[inline]
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Instruction::Text(_) => "text",
            Instruction::Dimension(_) => "dimension",
            Instruction::Model(_) => "model",
        }
    }
}

impl From<TextInstruction> for Instruction {
    fn from(value: TextInstruction) -> Self {
        Instruction::Text(value)
    }
}

impl From<DimensionInstruction> for Instruction {
    fn from(value: DimensionInstruction) -> Self {
        Instruction::Dimension(value)
    }
}

impl From<ModelInstruction> for Instruction {
    fn from(value: ModelInstruction) -> Self {
        Instruction::Model(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_kind_parsing() {
        assert_eq!("volume".parse::<TextKind>().unwrap(), TextKind::Volume);
        assert_eq!("line".parse::<TextKind>().unwrap(), TextKind::Line);
        let err = "hologram".parse::<TextKind>().unwrap_err();
        assert!(matches!(err, InstrError::UnsupportedInstructionKind(_)));
    }

    #[test]
    fn text_validation() {
        let text = TextInstruction::new("A", Frame::world_xy());
        assert_eq!(text.validate().unwrap(), TextKind::Volume);

        assert!(text.clone().with_size(0.0).validate().is_err());
        assert!(text.clone().with_thickness(-1.0).validate().is_err());
        assert!(TextInstruction::new("", Frame::world_xy()).validate().is_err());
        assert!(matches!(
            text.with_geometry_kind("raster").validate(),
            Err(InstrError::UnsupportedInstructionKind(_))
        ));
    }

    #[test]
    fn ids_are_unique_by_default() {
        let a = TextInstruction::new("A", Frame::world_xy());
        let b = TextInstruction::new("A", Frame::world_xy());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn instruction_serde_is_tagged() {
        let instruction: Instruction = TextInstruction::new("A", Frame::world_xy())
            .with_id("t-1")
            .into();
        let json = serde_json::to_value(&instruction).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["id"], "t-1");

        let back: Instruction = serde_json::from_value(json).unwrap();
        assert_eq!(back.id(), "t-1");
        assert_eq!(back.kind_name(), "text");
    }

    #[test]
    fn missing_id_is_generated() {
        let json = r#"{
            "kind": "model",
            "source_path": "models/bracket.obj",
            "location": {"origin":[0.0,0.0,0.0],"xaxis":[1.0,0.0,0.0],"yaxis":[0.0,1.0,0.0]},
            "target_location": {"origin":[5.0,0.0,0.0],"xaxis":[1.0,0.0,0.0],"yaxis":[0.0,1.0,0.0]}
        }"#;
        let instruction: Instruction = serde_json::from_str(json).unwrap();
        assert!(!instruction.id().is_empty());
    }
}
