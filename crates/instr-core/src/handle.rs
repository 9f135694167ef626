//! Host element handles

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier issued by the host for a created element.
///
/// The host may invalidate a handle at any time (external document edits);
/// this is only observable on the next reconciliation poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementHandle(u64);

impl ElementHandle {
    /// Wrap a raw host id
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw host id
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for ElementHandle {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
