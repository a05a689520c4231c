use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::BootError;

/// Looks up program images by file name under one root directory.
#[derive(Debug, Clone)]
pub struct FileService {
    root: PathBuf,
}

impl FileService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self, name: &str) -> bool {
        self.locate(name).is_ok()
    }

    /// Resolve `name` to a regular file inside the root.
    pub fn locate(&self, name: &str) -> Result<PathBuf, BootError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(BootError::InvalidName(name.to_string()));
        }
        let path = self.root.join(name);
        if !path.is_file() {
            return Err(BootError::ImageNotFound {
                name: name.to_string(),
                root: self.root.clone(),
            });
        }
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<Vec<u8>, BootError> {
        let path = self.locate(name)?;
        let bytes = fs::read(&path)?;
        if bytes.is_empty() {
            return Err(BootError::EmptyImage(name.to_string()));
        }
        debug!(path = %path.display(), len = bytes.len(), "image loaded");
        Ok(bytes)
    }

    /// Write an image into the root, replacing any existing one.
    pub fn store(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, BootError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(BootError::InvalidName(name.to_string()));
        }
        fs::create_dir_all(&self.root)?;
        let path = self.root.join(name);
        fs::write(&path, bytes)?;
        Ok(path)
    }
}
