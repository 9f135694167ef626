//! Instruction Storage
//!
//! Persists session metadata either inside the host project file
//! ([`ProjectStorage`]) or in a local JSON file ([`FileStorage`]).
//!
//! # Example
//!
//! ```rust,ignore
//! use instr_storage::{FileStorage, SessionSnapshot, StorageExt};
//!
//! let storage = FileStorage::new("session.json");
//! storage.save(&SessionSnapshot::capture(&registry, instructions))?;
//!
//! let snapshot: SessionSnapshot = storage.load()?;
//! snapshot.restore_into(&registry);
//! registry.clear()?;
//! ```

#![allow(missing_docs)]

pub mod file;
pub mod project;
pub mod snapshot;

pub use file::FileStorage;
pub use project::ProjectStorage;
pub use snapshot::SessionSnapshot;

use instr_core::HostError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Nothing stored under the key
    #[error("no data found for key: {key}")]
    NotFound { key: String },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Host project data call failed
    #[error("host error: {0}")]
    Host(#[from] HostError),
}

impl StorageError {
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Opaque string persistence
pub trait Storage: Send + Sync {
    fn save_str(&self, data: &str) -> Result<(), StorageError>;

    fn load_str(&self) -> Result<String, StorageError>;

    /// Write indented JSON
    fn pretty(&self) -> bool {
        false
    }
}

/// Typed JSON helpers over any [`Storage`]
pub trait StorageExt: Storage {
    /// Serialize `value` to JSON and store it
    ///
    /// # Errors
    /// `Serde` if serialization fails, otherwise whatever the backend reports
    fn save<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), StorageError> {
        let data = if self.pretty() {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        self.save_str(&data)
    }

    /// Load and deserialize a stored JSON value
    ///
    /// # Errors
    /// `NotFound` if nothing is stored, `Serde` if the data does not parse as `T`
    fn load<T: DeserializeOwned>(&self) -> Result<T, StorageError> {
        let data = self.load_str()?;
        Ok(serde_json::from_str(&data)?)
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}
