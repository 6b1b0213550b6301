//! Per-connection transfer state.

use std::fmt;
use std::path::PathBuf;

use scdft_file_store::{StagedFile, StagingGuard};
use scdft_protocol::Header;
use tracing::trace;

use crate::error::HandlerError;

/// Where a connection is in its single request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Buffering bytes until the header line is complete.
    AwaitingHeader,
    /// PUT accepted; payload bytes are being staged.
    AwaitingData,
    /// Response sent (or the request failed); nothing more is read.
    Responded,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::AwaitingHeader => "awaiting-header",
            SessionState::AwaitingData => "awaiting-data",
            SessionState::Responded => "responded",
        };
        f.write_str(s)
    }
}

/// An in-flight PUT.
struct Upload {
    final_path: PathBuf,
    staged: StagedFile,
    expected: u64,
    // Released once the staged file is committed or discarded.
    _guard: StagingGuard,
}

/// State owned by exactly one connection handler.
pub struct TransferSession {
    conn_id: u64,
    state: SessionState,
    header: Option<Header>,
    upload: Option<Upload>,
}

impl TransferSession {
    pub fn new(conn_id: u64) -> Self {
        Self {
            conn_id,
            state: SessionState::AwaitingHeader,
            header: None,
            upload: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The parsed request, once the header line is complete.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// Payload bytes staged so far.
    pub fn bytes_received(&self) -> u64 {
        self.upload.as_ref().map_or(0, |u| u.staged.written())
    }

    /// Payload bytes still expected.
    pub fn remaining(&self) -> u64 {
        self.upload
            .as_ref()
            .map_or(0, |u| u.expected.saturating_sub(u.staged.written()))
    }

    fn transition(&mut self, next: SessionState) {
        trace!(conn_id = self.conn_id, from = %self.state, to = %next, "session transition");
        self.state = next;
    }

    pub fn on_header(&mut self, header: Header) {
        self.header = Some(header);
    }

    /// Starts staging a PUT payload of `expected` bytes.
    pub(crate) fn begin_upload(
        &mut self,
        final_path: PathBuf,
        staged: StagedFile,
        expected: u64,
        guard: StagingGuard,
    ) {
        self.upload = Some(Upload {
            final_path,
            staged,
            expected,
            _guard: guard,
        });
        self.transition(SessionState::AwaitingData);
    }

    /// Stages one chunk. Returns `true` once the declared size is reached.
    pub async fn on_chunk(&mut self, bytes: &[u8]) -> Result<bool, HandlerError> {
        let upload = self
            .upload
            .as_mut()
            .ok_or_else(|| HandlerError::FileIo("no upload in progress".into()))?;
        let written = upload.staged.write_chunk(bytes).await?;
        Ok(written >= upload.expected)
    }

    /// Renames the staged file into place.
    pub async fn commit(&mut self) -> Result<PathBuf, HandlerError> {
        let upload = self
            .upload
            .take()
            .ok_or_else(|| HandlerError::FileIo("no upload in progress".into()))?;
        let result = upload.staged.commit(&upload.final_path).await;
        self.transition(SessionState::Responded);
        result?;
        Ok(upload.final_path)
    }

    /// Drops any partial upload; the final path is left untouched.
    pub async fn abort(&mut self) {
        if let Some(upload) = self.upload.take() {
            trace!(
                conn_id = self.conn_id,
                received = upload.staged.written(),
                expected = upload.expected,
                "discarding partial upload"
            );
            upload.staged.discard().await;
        }
        self.transition(SessionState::Responded);
    }

    pub fn finish(&mut self) {
        self.transition(SessionState::Responded);
    }
}
