//! Ownership tagging of host elements
//!
//! An element belongs to this system if and only if it carries a non-empty
//! value under the sentinel user attribute. The value is the correlation id of
//! the instruction that produced it.

use crate::error::InstrError;
use crate::handle::ElementHandle;
use crate::host::HostApi;
use std::fmt;
use std::sync::Arc;

/// Default sentinel attribute number
pub const ATTR_INSTRUCTION_ID: u32 = 666;

/// Marks and queries ownership tags
///
/// Every call is exactly one host attribute read or write. Failures are
/// returned to the caller, never retried.
#[derive(Clone)]
pub struct InstructionTagger {
    host: Arc<dyn HostApi>,
    key: u32,
    /// Resolved from host capabilities at construction
    can_remove: bool,
}

impl InstructionTagger {
    #[must_use]
    pub fn new(host: Arc<dyn HostApi>, key: u32) -> Self {
        let can_remove = host.capabilities().supports_attribute_removal;
        Self {
            host,
            key,
            can_remove,
        }
    }

    /// Sentinel attribute number
    #[inline]
    #[must_use]
    pub fn key(&self) -> u32 {
        self.key
    }

    /// Stamp `handle` as owned by the instruction `correlation_id`
    ///
    /// # Errors
    /// - `InvalidInstruction` for an empty id (it would read back as untagged)
    /// - `HostCallFailed` if the attribute write fails
    pub fn tag(&self, handle: ElementHandle, correlation_id: &str) -> Result<(), InstrError> {
        if correlation_id.is_empty() {
            return Err(InstrError::InvalidInstruction(
                "empty correlation id".to_string(),
            ));
        }
        self.host.set_attribute(&[handle], self.key, correlation_id)?;
        Ok(())
    }

    /// Remove the ownership tag from `handle`
    ///
    /// # Errors
    /// `HostCallFailed` if the attribute write fails
    pub fn untag(&self, handle: ElementHandle) -> Result<(), InstrError> {
        if self.can_remove {
            self.host.remove_attribute(&[handle], self.key)?;
        } else {
            self.host.set_attribute(&[handle], self.key, "")?;
        }
        Ok(())
    }

    /// Correlation id stored on `handle`, if tagged
    ///
    /// # Errors
    /// `HostCallFailed` if the attribute read fails
    pub fn correlation_id_of(&self, handle: ElementHandle) -> Result<Option<String>, InstrError> {
        let value = self.host.get_attribute(handle, self.key)?;
        Ok(value.filter(|v| !v.is_empty()))
    }

    /// Check whether `handle` carries the ownership tag
    ///
    /// # Errors
    /// `HostCallFailed` if the attribute read fails
    pub fn is_instruction(&self, handle: ElementHandle) -> Result<bool, InstrError> {
        Ok(self.correlation_id_of(handle)?.is_some())
    }

    /// Every host element carrying the tag, with its correlation id
    ///
    /// # Errors
    /// `HostCallFailed` if listing or any attribute read fails
    pub fn owned_elements(&self) -> Result<Vec<(ElementHandle, String)>, InstrError> {
        let mut owned = Vec::new();
        for handle in self.host.list_element_ids()? {
            if let Some(id) = self.correlation_id_of(handle)? {
                owned.push((handle, id));
            }
        }
        Ok(owned)
    }
}

impl fmt::Debug for InstructionTagger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstructionTagger")
            .field("key", &self.key)
            .field("can_remove", &self.can_remove)
            .finish_non_exhaustive()
    }
}
