//! Folder transfer orchestrator.
//!
//! Uploads every regular file of a directory (flat, name order) strictly
//! one at a time, counting failures and optionally stopping at the first.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::Client;
use crate::error::ClientError;

/// Progress of a folder transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    /// Upload of file `index` (0-based) of `total` started.
    FileStarted { index: usize, total: usize, name: String },
    /// Upload of file `index` finished.
    FileFinished {
        index: usize,
        name: String,
        error: Option<String>,
    },
}

/// Summary of a folder transfer that ran to the end of its file list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    /// Files whose upload was started.
    pub attempted: usize,
    /// Files whose upload failed.
    pub error_count: usize,
    /// Files found in the source directory.
    pub total: usize,
}

impl BatchReport {
    pub fn success(&self) -> bool {
        self.error_count == 0
    }

    pub fn message(&self) -> String {
        if self.success() {
            format!("all {} files transferred", self.total)
        } else {
            format!("some files have not been transferred: {}", self.error_count)
        }
    }
}

/// Runs folder transfers on top of a [`Client`].
pub struct TransferOrchestrator {
    client: Arc<Client>,
    events_tx: mpsc::Sender<BatchEvent>,
    events_rx: Option<mpsc::Receiver<BatchEvent>>,
}

impl TransferOrchestrator {
    pub fn new(client: Arc<Client>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            client,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<BatchEvent>> {
        self.events_rx.take()
    }

    /// Stops the transfer in progress; it is not resumed.
    pub fn cancel_token(&self) -> CancellationToken {
        self.client.cancel_token()
    }

    /// Uploads each file of `source` to `<dest_root>/<file name>`.
    ///
    /// With `break_on_error` the first failure ends the batch with
    /// [`ClientError::BatchAborted`]; otherwise every file is attempted and
    /// the failures are counted in the report.
    pub async fn send_folder(
        &self,
        source: &Path,
        dest_root: &str,
        break_on_error: bool,
    ) -> Result<BatchReport, ClientError> {
        let files = list_files(source).await?;
        if files.is_empty() {
            return Err(ClientError::NoFilesFound(source.display().to_string()));
        }

        let total = files.len();
        info!(source = %source.display(), dest = dest_root, total, "folder transfer started");

        let mut report = BatchReport {
            attempted: 0,
            error_count: 0,
            total,
        };

        for (index, file) in files.iter().enumerate() {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let remote = remote_path(dest_root, &name);

            // Progress is best-effort; a full or unread channel never blocks.
            let _ = self.events_tx.try_send(BatchEvent::FileStarted {
                index,
                total,
                name: name.clone(),
            });
            report.attempted += 1;

            let result = self.client.send_file(file, &remote).await;
            let _ = self.events_tx.try_send(BatchEvent::FileFinished {
                index,
                name: name.clone(),
                error: result.as_ref().err().map(|e| e.to_string()),
            });

            match result {
                Ok(()) => {}
                Err(ClientError::Cancelled) => {
                    warn!(file = %name, "folder transfer cancelled");
                    return Err(ClientError::Cancelled);
                }
                Err(e) => {
                    report.error_count += 1;
                    error!(file = %name, error = %e, "file transfer failed");
                    if break_on_error {
                        return Err(ClientError::BatchAborted {
                            file: name,
                            error_count: report.error_count,
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            attempted = report.attempted,
            errors = report.error_count,
            "folder transfer finished"
        );
        Ok(report)
    }
}

/// Joins a server directory and a file name with exactly one `/`.
pub fn remote_path(dest_root: &str, name: &str) -> String {
    format!("{}/{}", dest_root.trim_end_matches('/'), name.trim_start_matches('/'))
}

/// Regular files directly inside `dir`, sorted by name.
async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, ClientError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ClientError::FileNotFound(dir.display().to_string()));
        }
        Err(e) => {
            return Err(ClientError::FileIo(format!(
                "read directory error: {} => {e}",
                dir.display()
            )));
        }
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ClientError::FileIo(format!("read directory error: {} => {e}", dir.display())))?
    {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file {
            files.push(entry.path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestServer;

    /// `a` and `c` are fine; `b` is empty and fails before connecting.
    fn abc_folder() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"AAAA").unwrap();
        std::fs::write(dir.path().join("b.png"), b"").unwrap();
        std::fs::write(dir.path().join("c.png"), b"CCCC").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/d.png"), b"DDDD").unwrap();
        dir
    }

    #[test]
    fn remote_path_uses_single_separator() {
        assert_eq!(remote_path("/img", "a.png"), "/img/a.png");
        assert_eq!(remote_path("/img/", "a.png"), "/img/a.png");
        assert_eq!(remote_path("/", "a.png"), "/a.png");
        assert_eq!(remote_path("", "a.png"), "/a.png");
    }

    #[test]
    fn report_message() {
        let ok = BatchReport {
            attempted: 3,
            error_count: 0,
            total: 3,
        };
        assert!(ok.success());
        assert_eq!(ok.message(), "all 3 files transferred");

        let failed = BatchReport { error_count: 2, ..ok };
        assert!(!failed.success());
        assert_eq!(failed.message(), "some files have not been transferred: 2");
    }

    #[tokio::test]
    async fn listing_is_flat_and_sorted() {
        let dir = abc_folder();
        let files = list_files(dir.path()).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.png", "b.png", "c.png"]);
    }

    #[tokio::test]
    async fn continues_past_failures() {
        let server = TestServer::start().await;
        let dir = abc_folder();
        let mut orchestrator = TransferOrchestrator::new(Arc::new(server.client()));
        let mut events = orchestrator.take_events().unwrap();

        let report = orchestrator.send_folder(dir.path(), "/batch", false).await.unwrap();
        assert_eq!(report.attempted, 3);
        assert_eq!(report.error_count, 1);
        assert!(!report.success());

        assert_eq!(std::fs::read(server.root().join("batch/a.png")).unwrap(), b"AAAA");
        assert!(!server.root().join("batch/b.png").exists());
        assert_eq!(std::fs::read(server.root().join("batch/c.png")).unwrap(), b"CCCC");
        assert!(!server.root().join("batch/d.png").exists());

        let mut failed = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let BatchEvent::FileFinished { name, error: Some(_), .. } = event {
                failed.push(name);
            }
        }
        assert_eq!(failed, ["b.png"]);

        server.stop().await;
    }

    #[tokio::test]
    async fn break_on_error_stops_the_batch() {
        let server = TestServer::start().await;
        let dir = abc_folder();
        let orchestrator = TransferOrchestrator::new(Arc::new(server.client()));

        let err = orchestrator.send_folder(dir.path(), "/batch", true).await.unwrap_err();
        match err {
            ClientError::BatchAborted { file, error_count, .. } => {
                assert_eq!(file, "b.png");
                assert_eq!(error_count, 1);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(server.root().join("batch/a.png").exists());
        assert!(!server.root().join("batch/c.png").exists());

        server.stop().await;
    }

    #[tokio::test]
    async fn empty_folder_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = TransferOrchestrator::new(Arc::new(Client::new(Default::default())));

        let err = orchestrator.send_folder(dir.path(), "/x", false).await.unwrap_err();
        assert!(matches!(err, ClientError::NoFilesFound(_)));

        let err = orchestrator
            .send_folder(&dir.path().join("absent"), "/x", false)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn cancelled_batch_is_not_resumed() {
        let server = TestServer::start().await;
        let dir = abc_folder();
        let client = Arc::new(server.client());
        let orchestrator = TransferOrchestrator::new(Arc::clone(&client));

        orchestrator.cancel_token().cancel();
        let err = orchestrator.send_folder(dir.path(), "/batch", false).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
        assert!(!server.root().join("batch/a.png").exists());

        server.stop().await;
    }
}
