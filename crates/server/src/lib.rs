//! SCDFTH file server.
//!
//! The [`Dispatcher`] accepts connections forever and hands each socket to
//! its own connection handler task. A handler serves exactly one request
//! (GET, PUT or DEL) and then closes the connection:
//!
//! ```text
//! AwaitingHeader ──GET/DEL──────────────────────────► Responded
//!        │                                               ▲
//!        └──PUT──► AwaitingData ──size reached, commit───┘
//! ```
//!
//! Handlers share nothing mutable except the staging-path lock registry;
//! a failing handler never affects the dispatcher or other handlers.

mod config;
mod dispatcher;
mod error;
mod handler;
mod session;

pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use error::{HandlerError, ServerError};
pub use session::{SessionState, TransferSession};

pub use scdft_protocol::DEFAULT_PORT;

/// Socket read buffer size (64 KB).
pub const READ_BUFFER_SIZE: usize = 64 * 1024;
