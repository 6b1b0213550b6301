//! Staged writes: temp file next to the destination, then atomic rename.

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::{STAGED_EXTENSION, is_staged_name, staged_path};

/// An in-progress write to `<dir>/<stem>.tmp`.
///
/// Either [`commit`](Self::commit) or [`discard`](Self::discard) it. A
/// staged file dropped without either (e.g. its task was cancelled) removes
/// its temp file on a best-effort basis.
#[derive(Debug)]
pub struct StagedFile {
    file: Option<tokio::fs::File>,
    temp_path: PathBuf,
    written: u64,
    finished: bool,
}

/// Prepares a staged write for `final_path`.
///
/// Creates missing parent directories, removes an existing file at
/// `final_path` and opens the temp file for writing. A `final_path` with
/// the staging extension is rejected as [`StoreError::InvalidPath`].
pub async fn begin_write(final_path: &Path) -> Result<StagedFile, StoreError> {
    if is_staged_name(final_path) {
        return Err(StoreError::InvalidPath(format!(
            "'.{STAGED_EXTENSION}' names are reserved for uploads in progress: {}",
            final_path.display()
        )));
    }

    if let Some(dir) = final_path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| StoreError::io("create dir failure", dir, e))?;
    }

    match tokio::fs::remove_file(final_path).await {
        Ok(()) => debug!(path = %final_path.display(), "removed existing file before upload"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(StoreError::io(
                "removing existing file failure",
                final_path,
                e,
            ));
        }
    }

    let temp_path = staged_path(final_path);
    let file = tokio::fs::File::create(&temp_path)
        .await
        .map_err(|e| StoreError::io("open file error", &temp_path, e))?;

    Ok(StagedFile {
        file: Some(file),
        temp_path,
        written: 0,
        finished: false,
    })
}

impl StagedFile {
    /// Path of the temp file.
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Appends `bytes` and returns the running total.
    pub async fn write_chunk(&mut self, bytes: &[u8]) -> Result<u64, StoreError> {
        let Some(file) = self.file.as_mut() else {
            return Err(StoreError::FileIo(format!(
                "write file error: {} => already closed",
                self.temp_path.display()
            )));
        };

        file.write_all(bytes)
            .await
            .map_err(|e| StoreError::io("write file error", &self.temp_path, e))?;
        self.written += bytes.len() as u64;
        Ok(self.written)
    }

    /// Closes the temp file and renames it to `final_path`.
    ///
    /// On failure the temp file is removed; nothing partial survives.
    pub async fn commit(mut self, final_path: &Path) -> Result<(), StoreError> {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush().await {
                drop(file);
                self.remove_temp().await;
                return Err(StoreError::io("write file error", &self.temp_path, e));
            }
        }

        if let Err(e) = tokio::fs::rename(&self.temp_path, final_path).await {
            self.remove_temp().await;
            return Err(StoreError::io("rename file error", &self.temp_path, e));
        }

        self.finished = true;
        debug!(
            path = %final_path.display(),
            bytes = self.written,
            "staged file committed"
        );
        Ok(())
    }

    /// Closes and removes the temp file.
    pub async fn discard(mut self) {
        drop(self.file.take());
        self.remove_temp().await;
    }

    async fn remove_temp(&mut self) {
        self.finished = true;
        if let Err(e) = tokio::fs::remove_file(&self.temp_path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.temp_path.display(), error = %e, "failed to remove staged file");
            }
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.finished {
            drop(self.file.take());
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

/// Writes `bytes` to `final_path` through a staged file.
pub async fn write_atomic(final_path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut staged = begin_write(final_path).await?;
    if let Err(e) = staged.write_chunk(bytes).await {
        staged.discard().await;
        return Err(e);
    }
    staged.commit(final_path).await
}
