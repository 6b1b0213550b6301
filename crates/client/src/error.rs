//! Client error types.

use scdft_file_store::StoreError;
use scdft_protocol::ProtocolError;

/// Errors produced by the client engine and the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("{0}")]
    FileIo(String),

    /// The server's error line, verbatim.
    #[error("{0}")]
    Remote(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("could not save file: {0}")]
    Persist(String),

    #[error("no files found in {0}")]
    NoFilesFound(String),

    #[error("transfer of {file} failed, batch aborted after {error_count} error(s)")]
    BatchAborted {
        file: String,
        error_count: usize,
        /// The failed file's own error; logged, not displayed.
        message: String,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("timed out")]
    Timeout,
}

impl From<ProtocolError> for ClientError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => ClientError::Socket(e),
            ProtocolError::UnexpectedResponse(text) => ClientError::Remote(text),
            other => ClientError::Protocol(other.to_string()),
        }
    }
}

impl From<StoreError> for ClientError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(path) => ClientError::FileNotFound(path),
            other => ClientError::FileIo(other.to_string()),
        }
    }
}

/// Success flag plus message, as shown to a command-line user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

impl<T> From<&Result<T, ClientError>> for Outcome {
    fn from(result: &Result<T, ClientError>) -> Self {
        match result {
            Ok(_) => Outcome::ok("ok"),
            Err(e) => Outcome::failed(e.to_string()),
        }
    }
}
