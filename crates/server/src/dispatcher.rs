//! Connection dispatcher: the accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use scdft_file_store::{FileStore, StagingLocks};
use scdft_thumbnail::ThumbnailGenerator;
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::ServerConfig;
use crate::error::ServerError;
use crate::handler::{ConnectionHandler, HandlerContext};

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections and runs one handler task per connection.
///
/// Handlers are independent: a handler that fails or panics is logged and
/// reaped without touching the others or the accept loop.
pub struct Dispatcher {
    listener: TcpListener,
    ctx: HandlerContext,
    cancel: CancellationToken,
    next_id: AtomicU64,
    active: AtomicUsize,
}

impl Dispatcher {
    /// Validates the storage root and binds the listening socket.
    pub async fn bind(
        config: ServerConfig,
        thumbnailer: Arc<dyn ThumbnailGenerator>,
    ) -> Result<Self, ServerError> {
        let is_dir = tokio::fs::metadata(&config.root_path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(ServerError::RootNotFound(config.root_path.display().to_string()));
        }

        let addr = SocketAddr::new(config.bind_addr, config.port);
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        let local_addr = listener.local_addr()?;
        tracing::info!(
            %local_addr,
            root = %config.root_path.display(),
            "image server listening"
        );

        Ok(Self {
            listener,
            ctx: HandlerContext {
                store: FileStore::new(config.root_path),
                thumbnailer,
                locks: StagingLocks::new(),
                idle_timeout: config.idle_timeout,
            },
            cancel: CancellationToken::new(),
            next_id: AtomicU64::new(1),
            active: AtomicUsize::new(0),
        })
    }

    /// Returns the bound address (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Stops accepting and cancels in-flight handlers.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Number of handlers currently running.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Accepts connections until [`shutdown`](Self::shutdown).
    ///
    /// Returns after every handler has finished.
    pub async fn run(&self) -> Result<(), ServerError> {
        let mut handlers: JoinSet<u64> = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break;
                }

                Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                    self.reap(joined);
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                            tracing::info!(conn_id = id, %peer_addr, "connection accepted");

                            let handler = ConnectionHandler::new(id, self.ctx.clone());
                            let cancel = self.cancel.child_token();
                            self.active.fetch_add(1, Ordering::SeqCst);
                            handlers.spawn(async move {
                                handler.run(stream, cancel).await;
                                id
                            });
                        }
                        Err(e) => self.accept_failed(e).await,
                    }
                }
            }
        }

        while let Some(joined) = handlers.join_next().await {
            self.reap(joined);
        }
        Ok(())
    }

    /// Logs an accept error and pauses so a persistent one (e.g. EMFILE)
    /// does not spin the loop. Shutdown still interrupts the pause.
    async fn accept_failed(&self, err: std::io::Error) {
        tracing::error!(backoff_ms = ACCEPT_BACKOFF.as_millis() as u64, "accept error: {err}");
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(ACCEPT_BACKOFF) => {}
        }
    }

    fn reap(&self, joined: Result<u64, JoinError>) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        match joined {
            Ok(id) => tracing::info!(conn_id = id, "connection closed"),
            Err(e) if e.is_panic() => tracing::error!("connection handler panicked: {e}"),
            Err(e) => tracing::warn!("connection handler aborted: {e}"),
        }
    }
}
