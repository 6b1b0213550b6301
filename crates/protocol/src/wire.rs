//! Async framing helpers shared by the server handler and the client engine.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;
use crate::header::Header;
use crate::{MAX_HEADER_LEN, MAX_SIZE_LINE_LEN, MAX_STATUS_LEN, OK_RESPONSE};

/// Reads one `\n`-terminated line of at most `limit` bytes.
///
/// Returns whatever was read if the peer closes or the limit is hit first;
/// callers check for the terminator themselves.
async fn read_bounded_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    limit: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let mut line = Vec::new();
    let mut limited = (&mut *reader).take(limit as u64);
    limited.read_until(b'\n', &mut line).await?;
    Ok(line)
}

/// Reads and decodes the request header line.
///
/// Fails with [`ProtocolError::MalformedHeader`] when the peer closes
/// before a complete line arrives or the line exceeds [`MAX_HEADER_LEN`].
pub async fn read_header<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Header, ProtocolError> {
    let line = read_bounded_line(reader, MAX_HEADER_LEN).await?;
    if !line.is_empty() && line.last() != Some(&b'\n') {
        return Err(ProtocolError::MalformedHeader(format!(
            "incomplete header line ({} bytes, limit {MAX_HEADER_LEN})",
            line.len()
        )));
    }
    Header::parse(&line)
}

/// Writes an encoded header line.
pub async fn write_header<W: AsyncWrite + Unpin>(
    writer: &mut W,
    header: &Header,
) -> Result<(), ProtocolError> {
    let line = header.encode()?;
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}

/// Writes the GET size line (`<decimal size>\n`).
pub async fn write_size_line<W: AsyncWrite + Unpin>(
    writer: &mut W,
    size: u64,
) -> Result<(), ProtocolError> {
    writer.write_all(format!("{size}\n").as_bytes()).await?;
    Ok(())
}

/// Reads the GET size line.
///
/// A line that is not a decimal number is the server's error text and is
/// returned as [`ProtocolError::UnexpectedResponse`].
pub async fn read_size_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<u64, ProtocolError> {
    let line = read_bounded_line(reader, MAX_SIZE_LINE_LEN).await?;
    if line.is_empty() {
        return Err(ProtocolError::Closed);
    }

    let text = String::from_utf8_lossy(&line);
    let text = text.trim();
    text.parse::<u64>()
        .map_err(|_| ProtocolError::UnexpectedResponse(text.to_string()))
}

/// Writes the `ok` status.
pub async fn write_ok<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<(), ProtocolError> {
    writer.write_all(OK_RESPONSE.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Writes a single-line error description and flushes.
///
/// Embedded line breaks are flattened so the peer always sees one line.
pub async fn write_error_line<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &str,
) -> Result<(), ProtocolError> {
    let flat: String = message
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    writer.write_all(flat.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Reads a PUT/DEL status until the server closes the connection.
///
/// Succeeds only on `ok` (surrounding whitespace ignored); anything else is
/// returned verbatim as [`ProtocolError::UnexpectedResponse`].
pub async fn read_status<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(), ProtocolError> {
    let mut buf = Vec::new();
    (&mut *reader)
        .take(MAX_STATUS_LEN as u64)
        .read_to_end(&mut buf)
        .await?;

    if buf.is_empty() {
        return Err(ProtocolError::Closed);
    }

    let text = String::from_utf8_lossy(&buf);
    let text = text.trim();
    if text == OK_RESPONSE {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedResponse(text.to_string()))
    }
}
