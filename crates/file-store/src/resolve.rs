//! Protocol path resolution.

use std::path::{Component, Path, PathBuf};

use crate::error::StoreError;

/// A storage root that protocol paths resolve against.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a protocol path to `root + path[1..]`.
    ///
    /// Purely lexical: nothing on disk is touched.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let rel = validate_request_path(path)?;
        Ok(self.root.join(rel))
    }
}

/// Validates a protocol path and returns it without its leading `/`.
///
/// Rejects:
/// - Paths not starting with `/`
/// - The bare root (`/`)
/// - Parent directory traversal (`..`)
/// - Doubled roots and prefixes (`//etc`, `C:`)
pub fn validate_request_path(path: &str) -> Result<&str, StoreError> {
    let rel = path
        .strip_prefix('/')
        .ok_or_else(|| StoreError::InvalidPath(format!("remote file path must start with '/': {path}")))?;

    if rel.is_empty() {
        return Err(StoreError::InvalidPath("path names the storage root".into()));
    }

    for component in Path::new(rel).components() {
        match component {
            Component::ParentDir => {
                return Err(StoreError::InvalidPath(format!(
                    "parent directory traversal not allowed: {path}"
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(StoreError::InvalidPath(format!(
                    "absolute path not allowed below root: {path}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(rel)
}
