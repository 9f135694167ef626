//! Session snapshots
//!
//! Lets a later process take over elements an earlier session drew, so they
//! can be cleared even after a restart.

use instr_core::{ElementHandle, Instruction, Registry};
use serde::{Deserialize, Serialize};

/// Tracked handles and the instructions that produced them
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub handles: Vec<ElementHandle>,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
}

impl SessionSnapshot {
    /// Snapshot the registry's current handles
    #[must_use]
    pub fn capture(registry: &Registry, instructions: Vec<Instruction>) -> Self {
        Self {
            handles: registry.handles(),
            instructions,
        }
    }

    /// Track the snapshot's handles in `registry`
    ///
    /// # Returns
    /// Number of handles not already tracked
    pub fn restore_into(&self, registry: &Registry) -> usize {
        let adopted = registry.adopt(self.handles.iter().copied());
        tracing::info!(
            "Adopted {adopted} of {} handles from stored session",
            self.handles.len()
        );
        adopted
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty() && self.instructions.is_empty()
    }
}
