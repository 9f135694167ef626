//! Engine configuration

use crate::error::InstrError;
use crate::geometry::Precision;
use crate::tagger::ATTR_INSTRUCTION_ID;
use serde::{Deserialize, Serialize};

/// How text bounding box corners are read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CornerPolicy {
    /// Larger of the two in-plane extents is the width
    #[default]
    Heuristic,
    /// Fixed corner indices per geometry kind, falling back to the heuristic
    /// for kinds without a table
    Table,
}

/// Renderer and registry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// User attribute number carrying the ownership tag
    pub attribute_key: u32,
    /// Host color index for text
    pub text_color: u32,
    /// Offset along the text normal applied when centering
    pub text_standoff: f64,
    /// Anchor merge tolerance tier
    pub precision: Precision,
    pub corner_policy: CornerPolicy,
    /// Issue one registry redraw at the end of a batch
    pub redraw_after_batch: bool,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing keys keep their defaults
    ///
    /// # Errors
    /// `Config` if the document is malformed
    pub fn from_toml_str(source: &str) -> Result<Self, InstrError> {
        toml::from_str(source).map_err(|e| InstrError::Config(e.to_string()))
    }

    #[inline]
    #[must_use]
    pub fn with_attribute_key(mut self, key: u32) -> Self {
        self.attribute_key = key;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_text_color(mut self, color: u32) -> Self {
        self.text_color = color;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_text_standoff(mut self, standoff: f64) -> Self {
        self.text_standoff = standoff;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_corner_policy(mut self, policy: CornerPolicy) -> Self {
        self.corner_policy = policy;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_redraw_after_batch(mut self, redraw: bool) -> Self {
        self.redraw_after_batch = redraw;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            attribute_key: ATTR_INSTRUCTION_ID,
            text_color: 5,
            text_standoff: 5.0,
            precision: Precision::Medium,
            corner_policy: CornerPolicy::Heuristic,
            redraw_after_batch: true,
        }
    }
}
