//! Server configuration.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use scdft_protocol::DEFAULT_PORT;

/// Configuration handed to the [`Dispatcher`](crate::Dispatcher) at
/// construction. Handlers receive read-only copies of what they need.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: IpAddr,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Storage root; protocol paths resolve below it.
    pub root_path: PathBuf,
    /// Upper bound for every socket read; `None` waits indefinitely.
    pub idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            root_path: PathBuf::from("."),
            idle_timeout: None,
        }
    }
}

impl ServerConfig {
    pub fn new(port: u16, root_path: impl Into<PathBuf>) -> Self {
        Self {
            port,
            root_path: root_path.into(),
            ..Self::default()
        }
    }

    pub fn with_bind_addr(mut self, addr: IpAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }
}
