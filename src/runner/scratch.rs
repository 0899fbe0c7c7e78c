//! Per-execution scratch directory
//!
//! The directory is removed when the guard drops, whichever way the execution
//! ended. Removal failures are logged and swallowed.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::domain::{SandboxError, SandboxResult};

pub struct ScratchDir {
    path: PathBuf,
    dir: Option<TempDir>,
}

impl ScratchDir {
    /// Create a fresh directory, under `root` when given
    pub fn create(root: Option<&Path>) -> SandboxResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("codebox-");

        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(SandboxError::ScratchDir)?;

        let path = dir.path().to_path_buf();
        debug!("Created scratch directory {:?}", path);

        Ok(Self {
            path,
            dir: Some(dir),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a file directly inside the directory
    pub fn write_file(&self, name: &str, contents: &str) -> SandboxResult<PathBuf> {
        let file_path = self.path.join(name);
        std::fs::write(&file_path, contents).map_err(|source| SandboxError::WriteSource {
            path: file_path.clone(),
            source,
        })?;
        Ok(file_path)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            match dir.close() {
                Ok(()) => debug!("Removed scratch directory {:?}", self.path),
                Err(e) => warn!("Failed to remove scratch directory {:?}: {}", self.path, e),
            }
        }
    }
}
