//! Connection handler: serves one request per socket.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use scdft_file_store::{FileStore, StagingLocks, begin_write, delete, read_whole, thumbnail_path};
use scdft_protocol::Header;
use scdft_protocol::wire::{read_header, write_error_line, write_ok, write_size_line};
use scdft_thumbnail::ThumbnailGenerator;
use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::READ_BUFFER_SIZE;
use crate::error::HandlerError;
use crate::session::TransferSession;

/// Everything a handler needs; cloned per connection by the dispatcher.
#[derive(Clone)]
pub(crate) struct HandlerContext {
    pub store: FileStore,
    pub thumbnailer: Arc<dyn ThumbnailGenerator>,
    pub locks: StagingLocks,
    pub idle_timeout: Option<Duration>,
}

pub(crate) struct ConnectionHandler {
    id: u64,
    ctx: HandlerContext,
}

impl ConnectionHandler {
    pub fn new(id: u64, ctx: HandlerContext) -> Self {
        Self { id, ctx }
    }

    /// Serves the connection to completion, then closes it.
    pub async fn run(self, stream: TcpStream, cancel: CancellationToken) {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, reader);
        let mut session = TransferSession::new(self.id);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HandlerError::Cancelled),
            r = self.serve(&mut reader, &mut writer, &mut session) => r,
        };

        match result {
            Ok(()) => {
                let _ = writer.shutdown().await;
            }
            Err(e) => {
                session.abort().await;
                let request = session
                    .header()
                    .map_or_else(|| "-".to_string(), |h| format!("{} {}", h.command(), h.path()));
                if e.is_transport() {
                    warn!(conn_id = self.id, %request, error = %e, "connection aborted");
                    return;
                }
                warn!(conn_id = self.id, %request, error = %e, "request failed");
                if let Err(we) = write_error_line(&mut writer, &e.to_string()).await {
                    debug!(conn_id = self.id, error = %we, "could not deliver error response");
                }
                let _ = writer.shutdown().await;
            }
        }
    }

    async fn serve<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        session: &mut TransferSession,
    ) -> Result<(), HandlerError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let header = self.timed(read_header(reader)).await?;
        debug!(
            conn_id = self.id,
            command = %header.command(),
            path = header.path(),
            "request received"
        );

        let path = self.ctx.store.resolve(header.path())?;
        session.on_header(header.clone());

        match header {
            Header::Get { thumbnail, .. } => self.send_file(writer, &path, thumbnail).await?,
            Header::Put { size, .. } => self.receive_file(reader, writer, session, path, size).await?,
            Header::Del { .. } => self.delete_file(writer, &path).await?,
        }

        session.finish();
        Ok(())
    }

    async fn send_file<W>(&self, writer: &mut W, path: &Path, thumbnail: bool) -> Result<(), HandlerError>
    where
        W: AsyncWrite + Unpin,
    {
        let target = if thumbnail {
            // One generator per thumbnail at a time.
            let _guard = self.ctx.locks.lock(&thumbnail_path(path)).await;
            self.ctx
                .thumbnailer
                .thumbnail(path)
                .await
                .map_err(|e| HandlerError::Thumbnail(e.to_string()))?
        } else {
            path.to_path_buf()
        };

        let data = read_whole(&target).await?;
        write_size_line(writer, data.len() as u64).await?;
        writer.write_all(&data).await?;
        writer.flush().await?;

        info!(
            conn_id = self.id,
            path = %target.display(),
            bytes = data.len(),
            "file sent"
        );
        Ok(())
    }

    async fn receive_file<R, W>(
        &self,
        reader: &mut R,
        writer: &mut W,
        session: &mut TransferSession,
        path: PathBuf,
        size: u64,
    ) -> Result<(), HandlerError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let guard = self.ctx.locks.lock(&path).await;
        let staged = begin_write(&path).await?;
        debug!(
            conn_id = self.id,
            temp = %staged.temp_path().display(),
            size,
            "receiving file"
        );
        session.begin_upload(path, staged, size, guard);

        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        while session.remaining() > 0 {
            let want = session.remaining().min(buf.len() as u64) as usize;
            let n = self.timed(reader.read(&mut buf[..want])).await?;
            if n == 0 {
                return Err(HandlerError::Socket(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("peer closed after {} of {size} bytes", session.bytes_received()),
                )));
            }
            session.on_chunk(&buf[..n]).await?;
        }

        let saved = session.commit().await?;
        write_ok(writer).await?;

        info!(conn_id = self.id, path = %saved.display(), bytes = size, "file received");
        Ok(())
    }

    async fn delete_file<W>(&self, writer: &mut W, path: &Path) -> Result<(), HandlerError>
    where
        W: AsyncWrite + Unpin,
    {
        delete(path).await?;
        write_ok(writer).await?;
        info!(conn_id = self.id, path = %path.display(), "file deleted");
        Ok(())
    }

    /// Applies the idle timeout, if any, to a socket read.
    async fn timed<F, T, E>(&self, fut: F) -> Result<T, HandlerError>
    where
        F: Future<Output = Result<T, E>>,
        HandlerError: From<E>,
    {
        match self.ctx.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| HandlerError::Timeout)?
                .map_err(HandlerError::from),
            None => fut.await.map_err(HandlerError::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use scdft_thumbnail::ThumbnailFuture;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    use super::*;

    /// Writes a fixed marker thumbnail and counts real generations.
    struct MarkerThumbnailer {
        generated: Arc<AtomicUsize>,
    }

    impl ThumbnailGenerator for MarkerThumbnailer {
        fn thumbnail<'a>(&'a self, source: &'a Path) -> ThumbnailFuture<'a> {
            Box::pin(async move {
                let thumb = thumbnail_path(source);
                if !thumb.exists() {
                    if !source.exists() {
                        return Err(scdft_thumbnail::ThumbnailError::SourceNotFound(
                            source.display().to_string(),
                        ));
                    }
                    std::fs::write(&thumb, b"THUMB").unwrap();
                    self.generated.fetch_add(1, Ordering::SeqCst);
                }
                Ok(thumb)
            })
        }
    }

    fn context(root: &Path, generated: Arc<AtomicUsize>) -> HandlerContext {
        HandlerContext {
            store: FileStore::new(root),
            thumbnailer: Arc::new(MarkerThumbnailer { generated }),
            locks: StagingLocks::new(),
            idle_timeout: Some(Duration::from_secs(5)),
        }
    }

    /// Accepts exactly one connection and serves it.
    async fn serve_once(ctx: HandlerContext) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            ConnectionHandler::new(1, ctx)
                .run(stream, CancellationToken::new())
                .await;
        });
        (addr, handle)
    }

    async fn exchange(ctx: HandlerContext, request: &[u8]) -> Vec<u8> {
        let (addr, handle) = serve_once(ctx).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        handle.await.unwrap();
        response
    }

    #[tokio::test]
    async fn put_stores_payload_and_answers_ok() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), Arc::default());

        let response = exchange(ctx, b"SCDFTH:1.0\tPUT:/img/a.png\t4\nDEAD").await;
        assert_eq!(response, b"ok");
        assert_eq!(std::fs::read(dir.path().join("img/a.png")).unwrap(), b"DEAD");
        assert!(!dir.path().join("img/a.tmp").exists());
    }

    #[tokio::test]
    async fn get_returns_size_line_and_bytes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("img")).unwrap();
        std::fs::write(dir.path().join("img/a.png"), b"DEAD").unwrap();

        let response = exchange(context(dir.path(), Arc::default()), b"SCDFTH:1.0\tGET:/img/a.png\n").await;
        assert_eq!(response, b"4\nDEAD");
    }

    #[tokio::test]
    async fn get_thumbnail_generates_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"full image").unwrap();
        let generated = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let response = exchange(
                context(dir.path(), generated.clone()),
                b"SCDFTH:1.0\tGET:/a.png\tT\n",
            )
            .await;
            assert_eq!(response, b"5\nTHUMB");
        }
        assert_eq!(generated.load(Ordering::SeqCst), 1);
        assert!(dir.path().join("a.tmb.png").exists());
    }

    #[tokio::test]
    async fn get_missing_file_reports_error_line() {
        let dir = tempfile::tempdir().unwrap();
        let response = exchange(context(dir.path(), Arc::default()), b"SCDFTH:1.0\tGET:/nope.png\n").await;

        let text = String::from_utf8(response).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("file not exists"), "{text}");
    }

    #[tokio::test]
    async fn del_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.jpg"), b"x").unwrap();

        let response = exchange(context(dir.path(), Arc::default()), b"SCDFTH:1.0\tDEL:/x.jpg\n").await;
        assert_eq!(response, b"ok");
        assert!(!dir.path().join("x.jpg").exists());
    }

    #[tokio::test]
    async fn del_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let response = exchange(context(dir.path(), Arc::default()), b"SCDFTH:1.0\tDEL:/x.jpg\n").await;
        assert_ne!(response, b"ok");
        assert!(!response.is_empty());
    }

    #[tokio::test]
    async fn malformed_header_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let response = exchange(context(dir.path(), Arc::default()), b"HELLO\tGET:/a\n").await;

        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("malformed header"), "{text}");
    }

    #[tokio::test]
    async fn relative_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let response = exchange(context(dir.path(), Arc::default()), b"SCDFTH:1.0\tDEL:x.jpg\n").await;

        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("invalid path"), "{text}");
    }

    #[tokio::test]
    async fn put_to_staging_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let response = exchange(
            context(dir.path(), Arc::default()),
            b"SCDFTH:1.0\tPUT:/a.tmp\t4\nUSER",
        )
        .await;

        let text = String::from_utf8(response).unwrap();
        assert!(text.starts_with("invalid path"), "{text}");
        assert!(!dir.path().join("a.tmp").exists());

        let response = exchange(
            context(dir.path(), Arc::default()),
            b"SCDFTH:1.0\tPUT:/a.png\t4\nPNG!",
        )
        .await;
        assert_eq!(response, b"ok");
        assert_eq!(std::fs::read(dir.path().join("a.png")).unwrap(), b"PNG!");
        assert!(!dir.path().join("a.tmp").exists());
    }

    #[tokio::test]
    async fn final_file_absent_until_payload_complete() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, handle) = serve_once(context(dir.path(), Arc::default())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"SCDFTH:1.0\tPUT:/b.bin\t8\nABCD").await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(!dir.path().join("b.bin").exists());
        assert!(dir.path().join("b.tmp").exists());

        stream.write_all(b"EFGH").await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        handle.await.unwrap();

        assert_eq!(response, b"ok");
        assert_eq!(std::fs::read(dir.path().join("b.bin")).unwrap(), b"ABCDEFGH");
    }

    #[tokio::test]
    async fn early_close_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, handle) = serve_once(context(dir.path(), Arc::default())).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"SCDFTH:1.0\tPUT:/c.bin\t100\npartial").await.unwrap();
        drop(stream);
        handle.await.unwrap();

        assert!(!dir.path().join("c.bin").exists());
        assert!(!dir.path().join("c.tmp").exists());
    }

    #[tokio::test]
    async fn idle_peer_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path(), Arc::default());
        ctx.idle_timeout = Some(Duration::from_millis(100));
        let (addr, handle) = serve_once(ctx).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(b"SCDFTH:1.0\tPUT:/d.bin\t10\nab").await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("handler should give up on an idle peer")
            .unwrap();
        assert!(!dir.path().join("d.bin").exists());
        assert!(!dir.path().join("d.tmp").exists());
    }

    #[tokio::test]
    async fn cancellation_stops_handler() {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();

        let ctx = HandlerContext {
            idle_timeout: None,
            ..context(dir.path(), Arc::default())
        };
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            ConnectionHandler::new(7, ctx).run(stream, token).await;
        });

        let _stream = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("cancelled handler should exit")
            .unwrap();
    }
}
