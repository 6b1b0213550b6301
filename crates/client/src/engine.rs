//! Client connection engine.
//!
//! Each operation opens one connection, sends one header (plus payload for
//! PUT), reads the response and closes. Timeouts bound the connect and every
//! read; [`Client::stop`] force-closes whatever is in flight.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use scdft_file_store::{read_whole, thumbnail_path, write_atomic};
use scdft_protocol::wire::{read_size_line, read_status};
use scdft_protocol::{Command, Header, ProtocolError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::session::{ClientSession, Phase};
use crate::{READ_BUFFER_SIZE, RESET_GRACE};

/// What to do with a downloaded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMode {
    /// Hand the bytes back to the caller only.
    ToBuffer,
    /// Write the bytes to standard output.
    ToStdout,
    /// Save as `<dir>/<remote file name>`.
    ToFile(PathBuf),
    /// Save as `<dir>/<remote file stem>.tmb.png`.
    ToThumbnailFile(PathBuf),
}

/// A completed GET.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    /// Where the payload was persisted, for the file output modes.
    pub saved_to: Option<PathBuf>,
}

impl Download {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// SCDFTH client bound to one server.
///
/// Commands on one `Client` may run concurrently; each uses its own
/// connection. Once [`stop`](Self::stop) is called every further command
/// fails with [`ClientError::Cancelled`].
pub struct Client {
    config: ClientConfig,
    cancel: CancellationToken,
    last_session: Mutex<Option<ClientSession>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
            last_session: Mutex::new(None),
        }
    }

    /// Force-closes in-flight commands.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The most recently finished session.
    pub fn last_session(&self) -> Option<ClientSession> {
        self.last_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Uploads a local file to `remote`.
    ///
    /// The file is read fully before connecting; a missing, unreadable or
    /// empty source fails without touching the network.
    pub async fn send_file(&self, source: &Path, remote: &str) -> Result<(), ClientError> {
        let data = read_whole(source).await?;
        debug!(source = %source.display(), bytes = data.len(), "source file loaded");
        self.send_buffer(&data, remote).await
    }

    /// Uploads an in-memory buffer to `remote`.
    pub async fn send_buffer(&self, data: &[u8], remote: &str) -> Result<(), ClientError> {
        if data.is_empty() {
            return Err(ClientError::FileIo(format!("nothing to send to {remote}: empty payload")));
        }
        let header = Header::Put {
            path: remote.to_string(),
            size: data.len() as u64,
        };
        let line = header.encode()?;

        let mut session = ClientSession::new(Command::Put);
        let result = self
            .guarded(self.put_exchange(&mut session, line.as_bytes(), data))
            .await;
        self.record(session, &result);

        if result.is_ok() {
            info!(path = remote, bytes = data.len(), "file sent");
        }
        result
    }

    /// Downloads `remote` (or its thumbnail) and delivers it per `mode`.
    pub async fn request_file(
        &self,
        remote: &str,
        thumbnail: bool,
        mode: OutputMode,
    ) -> Result<Download, ClientError> {
        let header = Header::Get {
            path: remote.to_string(),
            thumbnail,
        };
        let line = header.encode()?;

        let mut session = ClientSession::new(Command::Get);
        let result = match self
            .guarded(self.get_exchange(&mut session, line.as_bytes()))
            .await
        {
            // The transfer itself succeeded; delivery can still fail.
            Ok(bytes) => deliver(remote, bytes, &mode).await,
            Err(e) => Err(e),
        };
        self.record(session, &result);

        if let Ok(download) = &result {
            info!(path = remote, thumbnail, bytes = download.len(), "file received");
        }
        result
    }

    /// Deletes `remote` on the server.
    pub async fn delete_file(&self, remote: &str) -> Result<(), ClientError> {
        let header = Header::Del {
            path: remote.to_string(),
        };
        let line = header.encode()?;

        let mut session = ClientSession::new(Command::Del);
        let result = self
            .guarded(self.del_exchange(&mut session, line.as_bytes()))
            .await;
        self.record(session, &result);

        if result.is_ok() {
            info!(path = remote, "file deleted");
        }
        result
    }

    async fn put_exchange(
        &self,
        session: &mut ClientSession,
        line: &[u8],
        data: &[u8],
    ) -> Result<(), ClientError> {
        let (mut reader, mut writer) = self.connect().await?;

        session.advance(Phase::SendHeaderAndPayload);
        if let Err(e) = write_parts(&mut writer, &[line, data]).await {
            return Err(self.reset_reason(&mut reader, e).await);
        }

        session.advance(Phase::AwaitingResponse);
        self.timed(read_status(&mut reader)).await
    }

    async fn get_exchange(&self, session: &mut ClientSession, line: &[u8]) -> Result<Vec<u8>, ClientError> {
        let (reader, mut writer) = self.connect().await?;
        let mut reader = BufReader::with_capacity(READ_BUFFER_SIZE, reader);

        session.advance(Phase::SendHeader);
        write_parts(&mut writer, &[line]).await?;

        session.advance(Phase::AwaitingSizeLine);
        let size = self.timed(read_size_line(&mut reader)).await?;
        debug!(size, "size line received");

        session.advance(Phase::AwaitingPayload);
        self.read_payload(&mut reader, size).await
    }

    async fn del_exchange(&self, session: &mut ClientSession, line: &[u8]) -> Result<(), ClientError> {
        let (mut reader, mut writer) = self.connect().await?;

        session.advance(Phase::SendHeader);
        write_parts(&mut writer, &[line]).await?;

        session.advance(Phase::AwaitingResponse);
        self.timed(read_status(&mut reader)).await
    }

    async fn connect(&self) -> Result<(OwnedReadHalf, OwnedWriteHalf), ClientError> {
        let host = self.config.host.as_str();
        let port = self.config.port;
        let stream = self.timed(TcpStream::connect((host, port))).await?;
        debug!(host, port, "connected");
        Ok(stream.into_split())
    }

    /// Reads exactly `size` payload bytes.
    async fn read_payload<R: AsyncRead + Unpin>(&self, reader: &mut R, size: u64) -> Result<Vec<u8>, ClientError> {
        let mut data = Vec::with_capacity(size.min(READ_BUFFER_SIZE as u64 * 16) as usize);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        while (data.len() as u64) < size {
            let want = (size - data.len() as u64).min(buf.len() as u64) as usize;
            let n = self.timed(reader.read(&mut buf[..want])).await?;
            if n == 0 {
                return Err(ClientError::Protocol(format!(
                    "connection closed after {} of {size} bytes",
                    data.len()
                )));
            }
            data.extend_from_slice(&buf[..n]);
        }
        Ok(data)
    }

    /// Maps a failed upload write to the server's error line when the
    /// server answered and closed before taking the whole payload.
    async fn reset_reason(&self, reader: &mut OwnedReadHalf, err: std::io::Error) -> ClientError {
        if matches!(err.kind(), ErrorKind::ConnectionReset | ErrorKind::BrokenPipe) {
            if let Ok(Err(ProtocolError::UnexpectedResponse(text))) =
                tokio::time::timeout(RESET_GRACE, read_status(reader)).await
            {
                return ClientError::Remote(text);
            }
        }
        warn!(error = %err, "upload interrupted");
        ClientError::Socket(err)
    }

    /// Races `fut` against [`stop`](Self::stop). Losing drops the future and
    /// with it the socket.
    async fn guarded<T, F>(&self, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, ClientError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClientError::Cancelled),
            result = fut => result,
        }
    }

    async fn timed<F, T, E>(&self, fut: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, E>>,
        ClientError: From<E>,
    {
        match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| ClientError::Timeout)?
                .map_err(ClientError::from),
            None => fut.await.map_err(ClientError::from),
        }
    }

    fn record<T>(&self, mut session: ClientSession, result: &Result<T, ClientError>) {
        session.finish(result.as_ref().err().map(|e| e.to_string()));
        debug!(command = %session.command(), status = ?session.status(), "session finished");
        *self
            .last_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(session);
    }
}

async fn write_parts<W: AsyncWrite + Unpin>(writer: &mut W, parts: &[&[u8]]) -> std::io::Result<()> {
    for part in parts {
        writer.write_all(part).await?;
    }
    writer.flush().await
}

/// Applies the output mode to a fully received payload.
async fn deliver(remote: &str, bytes: Vec<u8>, mode: &OutputMode) -> Result<Download, ClientError> {
    let saved_to = match mode {
        OutputMode::ToBuffer => None,
        OutputMode::ToStdout => {
            write_output(&mut tokio::io::stdout(), &bytes).await?;
            None
        }
        OutputMode::ToFile(dir) => Some(persist(dir.join(file_name(remote)?), &bytes).await?),
        OutputMode::ToThumbnailFile(dir) => {
            let target = thumbnail_path(&dir.join(file_name(remote)?));
            Some(persist(target, &bytes).await?)
        }
    };
    Ok(Download { bytes, saved_to })
}

/// Writes a payload to a local stream; failures are local, not socket errors.
async fn write_output<W: AsyncWrite + Unpin>(out: &mut W, bytes: &[u8]) -> Result<(), ClientError> {
    write_parts(out, &[bytes])
        .await
        .map_err(|e| ClientError::Persist(format!("writing to stdout failed: {e}")))
}

async fn persist(target: PathBuf, bytes: &[u8]) -> Result<PathBuf, ClientError> {
    write_atomic(&target, bytes)
        .await
        .map_err(|e| ClientError::Persist(e.to_string()))?;
    debug!(path = %target.display(), "payload saved");
    Ok(target)
}

fn file_name(remote: &str) -> Result<&str, ClientError> {
    Path::new(remote)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ClientError::Persist(format!("remote path has no file name: {remote}")))
}
