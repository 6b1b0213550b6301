//! SCDFTH wire protocol: one request per TCP connection.
//!
//! A request is a single text header line, optionally followed by a raw
//! binary payload (PUT only). The server answers with either a short
//! status (`ok`), a size line followed by raw bytes (GET), or a single
//! free-text error line, then closes the connection.
//!
//! # Wire format
//!
//! ```text
//! REQUEST:   SCDFTH:1.0\t<CMD>:<path>[\t<extra>]\n [payload]
//!   <CMD>    GET | PUT | DEL
//!   <extra>  decimal byte count (PUT), literal `T` (GET thumbnail)
//!
//! RESPONSE:  ok                          (PUT, DEL)
//!            <decimal size>\n<size bytes> (GET)
//!            <error text>\n              (any failure)
//! ```
//!
//! See [`header`] for the request codec and [`wire`] for async framing
//! helpers.

pub mod error;
pub mod header;
pub mod wire;

pub use error::ProtocolError;
pub use header::{Command, Header};

/// Protocol tag and version, the mandatory first header field.
pub const PROTOCOL_TAG: &str = "SCDFTH:1.0";

/// Maximum length of a request header line, newline included.
pub const MAX_HEADER_LEN: usize = 1024;

/// Maximum length of the GET size line sent by the server.
pub const MAX_SIZE_LINE_LEN: usize = 256;

/// Maximum length of a PUT/DEL status response read by the client.
pub const MAX_STATUS_LEN: usize = 1024;

/// Success status for PUT and DEL.
pub const OK_RESPONSE: &str = "ok";

/// Third header field requesting a thumbnail on GET.
pub const THUMBNAIL_FLAG: &str = "T";

/// Default server port.
pub const DEFAULT_PORT: u16 = 12345;
