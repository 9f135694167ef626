//! Local file storage

use crate::{Storage, StorageError};
use std::io;
use std::path::{Path, PathBuf};

/// Stores pretty-printed JSON in a local file
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> StorageError {
        if source.kind() == io::ErrorKind::NotFound {
            StorageError::NotFound {
                key: self.path.display().to_string(),
            }
        } else {
            StorageError::Io {
                path: self.path.clone(),
                source,
            }
        }
    }
}

impl Storage for FileStorage {
    fn save_str(&self, data: &str) -> Result<(), StorageError> {
        std::fs::write(&self.path, data).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!("Saved {} bytes to {}", data.len(), self.path.display());
        Ok(())
    }

    fn load_str(&self) -> Result<String, StorageError> {
        let data = std::fs::read_to_string(&self.path).map_err(|e| self.io_error(e))?;
        tracing::debug!("Loaded {} bytes from {}", data.len(), self.path.display());
        Ok(data)
    }

    fn pretty(&self) -> bool {
        true
    }
}
