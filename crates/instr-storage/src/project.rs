//! Host project-data storage

use crate::{Storage, StorageError};
use instr_core::ProjectDataStore;
use std::fmt;
use std::sync::Arc;

/// Stores data under a key inside the currently open host project
pub struct ProjectStorage {
    store: Arc<dyn ProjectDataStore>,
    key: String,
}

impl ProjectStorage {
    #[must_use]
    pub fn new(store: Arc<dyn ProjectDataStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Storage for ProjectStorage {
    fn save_str(&self, data: &str) -> Result<(), StorageError> {
        self.store.set_project_data(&self.key, data)?;
        tracing::debug!("Saved {} bytes to project data '{}'", data.len(), self.key);
        Ok(())
    }

    /// An empty stored value counts as missing
    fn load_str(&self) -> Result<String, StorageError> {
        match self.store.get_project_data(&self.key)? {
            Some(data) if !data.is_empty() => {
                tracing::debug!("Loaded {} bytes from project data '{}'", data.len(), self.key);
                Ok(data)
            }
            _ => Err(StorageError::NotFound {
                key: self.key.clone(),
            }),
        }
    }
}

impl fmt::Debug for ProjectStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectStorage")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
