//! Error types for the header codec and response framing.

/// Errors produced while encoding or decoding protocol lines.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The peer answered with something other than the expected status or
    /// size line. Carries the peer's text verbatim (trimmed), which is the
    /// server's error description in practice.
    #[error("{0}")]
    UnexpectedResponse(String),

    #[error("connection closed before a response arrived")]
    Closed,
}
