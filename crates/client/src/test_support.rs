//! A real server on 127.0.0.1 for client tests.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use scdft_server::{Dispatcher, ServerConfig};
use scdft_thumbnail::ImageThumbnailer;
use tempfile::TempDir;
use tokio::task::JoinHandle;

use crate::{Client, ClientConfig};

pub(crate) struct TestServer {
    root: TempDir,
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let root = tempfile::tempdir().unwrap();
        let config = ServerConfig::new(0, root.path()).with_bind_addr(IpAddr::V4(Ipv4Addr::LOCALHOST));
        let dispatcher = Arc::new(
            Dispatcher::bind(config, Arc::new(ImageThumbnailer::default()))
                .await
                .unwrap(),
        );
        let addr = dispatcher.local_addr().unwrap();
        let runner = Arc::clone(&dispatcher);
        let handle = tokio::spawn(async move {
            runner.run().await.unwrap();
        });
        Self {
            root,
            addr,
            dispatcher,
            handle,
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    pub fn client(&self) -> Client {
        Client::new(ClientConfig::new(self.addr.ip().to_string(), self.addr.port()))
    }

    pub async fn stop(self) {
        self.dispatcher.shutdown();
        self.handle.await.unwrap();
    }
}
