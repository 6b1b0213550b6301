//! SCDFTH client.
//!
//! [`Client`] drives one command per connection (PUT, GET or DEL) and
//! reports each outcome as a `Result`; [`TransferOrchestrator`] uploads a
//! whole directory one file at a time on top of it.

mod config;
mod engine;
mod error;
mod orchestrator;
mod session;

#[cfg(test)]
mod test_support;

pub use config::ClientConfig;
pub use engine::{Client, Download, OutputMode};
pub use error::{ClientError, Outcome};
pub use orchestrator::{BatchEvent, BatchReport, TransferOrchestrator, remote_path};
pub use session::{ClientSession, Phase, SessionStatus};

use std::time::Duration;

/// Default connect/read timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Socket read buffer size (64 KB).
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// How long to wait for the server's error line after a reset mid-upload.
pub(crate) const RESET_GRACE: Duration = Duration::from_millis(500);
