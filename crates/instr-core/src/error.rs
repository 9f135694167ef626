//! Error types for instruction handling
//!
//! Provides error handling for:
//! - Degenerate geometry during frame reconstruction
//! - Host API call failures (whole-call and partial batch failures)
//! - Unsupported or malformed instructions
//! - Render failures reported per instruction and stage

use crate::handle::ElementHandle;
use crate::renderer::RenderStage;

/// Main instruction error type
#[derive(Debug, thiserror::Error)]
pub enum InstrError {
    /// Zero-length or parallel axis vectors
    #[error("degenerate geometry: {reason}")]
    DegenerateGeometry { reason: String },

    /// A host API call raised
    #[error("host call failed: {0}")]
    HostCallFailed(#[from] HostError),

    /// Unknown geometry/text kind requested
    #[error("unsupported instruction kind: {0}")]
    UnsupportedInstructionKind(String),

    /// Instruction data cannot be rendered as given
    #[error("invalid instruction: {0}")]
    InvalidInstruction(String),

    /// Render stage machine was driven out of order
    #[error("illegal render transition: {from} -> {to}")]
    IllegalTransition { from: RenderStage, to: RenderStage },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl InstrError {
    /// Create a degenerate geometry error
    #[inline]
    pub fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateGeometry {
            reason: reason.into(),
        }
    }

    /// Check if retrying the same call may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::HostCallFailed(_))
    }

    /// Check if error stems from the instruction's geometry
    #[inline]
    #[must_use]
    pub fn is_geometry(&self) -> bool {
        matches!(self, Self::DegenerateGeometry { .. })
    }
}

/// Errors raised by the CAD host binding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// The whole call failed
    #[error("{op} failed: {message}")]
    Call { op: &'static str, message: String },

    /// A batch call where only the listed handles failed
    #[error("{op} failed for {} handle(s)", .failed.len())]
    Partial {
        op: &'static str,
        failed: Vec<ElementHandle>,
    },
}

impl HostError {
    /// Create a whole-call failure
    #[inline]
    pub fn call(op: &'static str, message: impl Into<String>) -> Self {
        Self::Call {
            op,
            message: message.into(),
        }
    }

    /// Name of the host operation that failed
    #[inline]
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Self::Call { op, .. } | Self::Partial { op, .. } => op,
        }
    }

    /// Handles the host reports as not processed.
    ///
    /// `None` means the host gave no per-handle information.
    #[inline]
    #[must_use]
    pub fn failed_handles(&self) -> Option<&[ElementHandle]> {
        match self {
            Self::Call { .. } => None,
            Self::Partial { failed, .. } => Some(failed),
        }
    }
}

/// A failed render, naming the instruction and how far it got
#[derive(Debug, thiserror::Error)]
#[error("instruction {instruction_id} failed after {stage}: {source}")]
pub struct RenderError {
    /// Correlation id of the failing instruction
    pub instruction_id: String,
    /// Last stage the instruction completed before failing
    pub stage: RenderStage,
    /// Underlying cause
    #[source]
    pub source: InstrError,
}

impl RenderError {
    /// Check if the failure happened before any host element existed
    #[inline]
    #[must_use]
    pub fn before_host_creation(&self) -> bool {
        self.stage == RenderStage::Pending
    }
}
