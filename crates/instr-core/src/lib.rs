//! Instruction Core
//!
//! Tracks and places transient "instruction" elements (annotation text, linear
//! dimensions, light reference models) that are drawn into a CAD host document:
//! - Ownership tagging of host elements ([`InstructionTagger`])
//! - A per-session registry of created handles with clear/redraw ([`Registry`])
//! - Frame and offset reconstruction from host-reported geometry ([`placement`])
//! - A staged renderer that never leaks half-created host elements ([`InstructionRenderer`])
//!
//! The host itself is reached only through the [`HostApi`] capability.
//!
//! # Example
//!
//! ```rust,ignore
//! use instr_core::prelude::*;
//! use std::sync::Arc;
//!
//! let host: Arc<dyn HostApi> = connect_to_host();
//! let registry = Arc::new(Registry::new(host.clone()));
//! let renderer = InstructionRenderer::new(host, registry.clone(), EngineConfig::new());
//!
//! let text = TextInstruction::new("A", Frame::world_xy());
//! let rendered = renderer.render(&text.into())?;
//! println!("drew {}", rendered.handle);
//!
//! registry.clear()?;
//! ```

#![allow(missing_docs)]

pub mod config;
pub mod dimension;
pub mod error;
pub mod geometry;
pub mod handle;
pub mod host;
pub mod instruction;
pub mod placement;
pub mod registry;
pub mod renderer;
pub mod tagger;

pub use config::{CornerPolicy, EngineConfig};
pub use dimension::{read_dimension, DimensionReading};
pub use error::{HostError, InstrError, RenderError};
pub use geometry::{AnchorPoint, Frame, Point, Precision, Tolerance, Vector};
pub use handle::ElementHandle;
pub use host::{HostApi, HostCapabilities, ProjectDataStore, RawDimension, TextOptions};
pub use instruction::{
    DimensionInstruction, Instruction, ModelInstruction, TextInstruction, TextKind,
};
pub use placement::{DimensionLayout, Extents, Run};
pub use registry::{Registry, RegistryStats};
pub use renderer::{BatchReport, InstructionRenderer, RenderStage, Rendered};
pub use tagger::{InstructionTagger, ATTR_INSTRUCTION_ID};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with instruction elements
    pub use crate::{
        AnchorPoint, DimensionInstruction, ElementHandle, EngineConfig, Frame, HostApi,
        Instruction, InstructionRenderer, InstructionTagger, ModelInstruction, Precision,
        Registry, TextInstruction,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
