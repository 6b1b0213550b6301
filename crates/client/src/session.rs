//! Client-side session state for one command.

use std::fmt;

use scdft_protocol::Command;
use tracing::trace;

/// Step of a single client exchange.
///
/// - PUT: `Connecting → SendHeaderAndPayload → AwaitingResponse`
/// - DEL: `Connecting → SendHeader → AwaitingResponse`
/// - GET: `Connecting → SendHeader → AwaitingSizeLine → AwaitingPayload`
///
/// Every session ends in `Closed` with a final [`SessionStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    SendHeader,
    SendHeaderAndPayload,
    AwaitingResponse,
    AwaitingSizeLine,
    AwaitingPayload,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Connecting => "connecting",
            Phase::SendHeader => "send-header",
            Phase::SendHeaderAndPayload => "send-header-and-payload",
            Phase::AwaitingResponse => "awaiting-response",
            Phase::AwaitingSizeLine => "awaiting-size-line",
            Phase::AwaitingPayload => "awaiting-payload",
            Phase::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Success,
    Error(String),
}

/// Phase history and final status of one command.
#[derive(Debug, Clone)]
pub struct ClientSession {
    command: Command,
    phase: Phase,
    status: SessionStatus,
    history: Vec<Phase>,
}

impl ClientSession {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            phase: Phase::Connecting,
            status: SessionStatus::Pending,
            history: vec![Phase::Connecting],
        }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Every phase entered so far, in order.
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Closed
    }

    pub(crate) fn advance(&mut self, next: Phase) {
        if self.phase == next || self.is_finished() {
            return;
        }
        trace!(command = %self.command, from = %self.phase, to = %next, "client phase");
        self.phase = next;
        self.history.push(next);
    }

    /// Closes the session with the outcome of the exchange.
    pub(crate) fn finish(&mut self, error: Option<String>) {
        if self.is_finished() {
            return;
        }
        self.status = match error {
            None => SessionStatus::Success,
            Some(message) => SessionStatus::Error(message),
        };
        self.advance(Phase::Closed);
    }
}
