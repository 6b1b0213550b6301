//! Error types for the server.

use std::net::SocketAddr;

use scdft_file_store::StoreError;
use scdft_protocol::ProtocolError;

/// Fatal dispatcher errors (startup and accept loop).
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("root path does not exist: {0}")]
    RootNotFound(String),

    #[error("unable to start server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a single request.
///
/// Everything except the transport variants is reported to the peer as a
/// one-line error response before the connection closes.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{0}")]
    MalformedHeader(String),

    #[error("{0}")]
    InvalidPath(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    FileIo(String),

    #[error("{0}")]
    Thumbnail(String),

    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("idle timeout")]
    Timeout,

    #[error("cancelled")]
    Cancelled,
}

impl HandlerError {
    /// True when the peer is assumed unreachable and nothing should be
    /// written back.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            HandlerError::Socket(_) | HandlerError::Timeout | HandlerError::Cancelled
        )
    }
}

impl From<ProtocolError> for HandlerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => HandlerError::Socket(e),
            ProtocolError::InvalidPath(_) => HandlerError::InvalidPath(err.to_string()),
            ProtocolError::MalformedHeader(_)
            | ProtocolError::UnexpectedResponse(_)
            | ProtocolError::Closed => HandlerError::MalformedHeader(err.to_string()),
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidPath(_) => HandlerError::InvalidPath(err.to_string()),
            StoreError::NotFound(_) => HandlerError::NotFound(err.to_string()),
            StoreError::FileIo(_) => HandlerError::FileIo(err.to_string()),
        }
    }
}
