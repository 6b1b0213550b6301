//! Error types for the file store.

/// Errors produced by file store operations.
///
/// Messages are written to the remote peer verbatim, so they name the
/// operation and the path involved.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("file not exists: {0}")]
    NotFound(String),

    #[error("{0}")]
    FileIo(String),
}

impl StoreError {
    pub(crate) fn io(what: &str, path: &std::path::Path, err: std::io::Error) -> Self {
        StoreError::FileIo(format!("{what}: {} => {err}", path.display()))
    }
}
