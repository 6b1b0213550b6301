//! Whole-file reads and deletion.

use std::path::Path;

use crate::error::StoreError;

/// Reads a file fully into memory.
///
/// A missing file is [`StoreError::NotFound`]; an unreadable or empty file
/// is [`StoreError::FileIo`].
pub async fn read_whole(path: &Path) -> Result<Vec<u8>, StoreError> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        Err(e) => return Err(StoreError::io("read file error", path, e)),
    };

    if data.is_empty() {
        return Err(StoreError::FileIo(format!(
            "read file error: {} => empty file",
            path.display()
        )));
    }

    Ok(data)
}

/// Deletes a single file.
pub async fn delete(path: &Path) -> Result<(), StoreError> {
    tokio::fs::remove_file(path)
        .await
        .map_err(|e| StoreError::io("delete file error", path, e))?;
    tracing::debug!(path = %path.display(), "file deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_whole_returns_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        assert_eq!(read_whole(&path).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn read_whole_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_whole(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn read_whole_empty_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        let err = read_whole(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::FileIo(_)));
    }

    #[tokio::test]
    async fn delete_existing_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"x").unwrap();

        delete(&path).await.unwrap();
        assert!(!path.exists());

        let err = delete(&path).await.unwrap_err();
        assert!(err.to_string().starts_with("delete file error"));
    }
}
