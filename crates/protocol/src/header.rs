//! Request header codec.
//!
//! ```text
//! SCDFTH:1.0\tGET:/img/a.png\n       download a file
//! SCDFTH:1.0\tGET:/img/a.png\tT\n    download the thumbnail of a file
//! SCDFTH:1.0\tPUT:/img/a.png\t4\n    upload 4 bytes (payload follows)
//! SCDFTH:1.0\tDEL:/img/a.png\n       delete a file
//! ```
//!
//! Parsing and encoding are pure; the async line reading lives in
//! [`crate::wire`].

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;
use crate::{PROTOCOL_TAG, THUMBNAIL_FLAG};

/// Request command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Get,
    Put,
    Del,
}

impl Command {
    /// Wire name of the command.
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Get => "GET",
            Command::Put => "PUT",
            Command::Del => "DEL",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Command::Get),
            "PUT" => Ok(Command::Put),
            "DEL" => Ok(Command::Del),
            other => Err(ProtocolError::MalformedHeader(format!(
                "unknown command: {other}"
            ))),
        }
    }
}

/// A decoded request header.
///
/// Each variant carries exactly the metadata legal for its command: a
/// positive payload size for PUT, the thumbnail flag for GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    Get { path: String, thumbnail: bool },
    Put { path: String, size: u64 },
    Del { path: String },
}

impl Header {
    /// Returns the header's command.
    pub fn command(&self) -> Command {
        match self {
            Header::Get { .. } => Command::Get,
            Header::Put { .. } => Command::Put,
            Header::Del { .. } => Command::Del,
        }
    }

    /// Returns the requested server path (as sent, leading `/` included).
    pub fn path(&self) -> &str {
        match self {
            Header::Get { path, .. } | Header::Put { path, .. } | Header::Del { path } => path,
        }
    }

    /// Serializes the header to its wire line, trailing `\n` included.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        validate_path_chars(self.path())?;

        let extra = match self {
            Header::Get {
                thumbnail: true, ..
            } => format!("\t{THUMBNAIL_FLAG}"),
            Header::Get { .. } | Header::Del { .. } => String::new(),
            Header::Put { size: 0, .. } => {
                return Err(ProtocolError::MalformedHeader(
                    "PUT size must be greater than zero".into(),
                ));
            }
            Header::Put { size, .. } => format!("\t{size}"),
        };

        Ok(format!(
            "{PROTOCOL_TAG}\t{}:{}{extra}\n",
            self.command(),
            self.path()
        ))
    }

    /// Parses one header line as read from the socket.
    ///
    /// The line may include its trailing `\n` (and a `\r` before it).
    /// An empty line means the peer closed before sending a header.
    pub fn parse(line: &[u8]) -> Result<Self, ProtocolError> {
        if line.is_empty() {
            return Err(ProtocolError::MalformedHeader("empty header line".into()));
        }

        let decoded = decode_line(line);
        let text: &str = &decoded;
        let text = text.strip_suffix('\n').unwrap_or(text);
        let text = text.strip_suffix('\r').unwrap_or(text);

        let fields: Vec<&str> = text.split('\t').filter(|f| !f.is_empty()).collect();
        if fields.len() < 2 || fields.len() > 3 {
            return Err(malformed(text));
        }

        if fields[0] != PROTOCOL_TAG {
            return Err(ProtocolError::MalformedHeader(format!(
                "bad header tag: {}",
                fields[0]
            )));
        }

        let bad_item = || ProtocolError::MalformedHeader(format!("bad header item: {}", fields[1]));
        let (name, path) = fields[1].split_once(':').ok_or_else(bad_item)?;
        if path.contains(':') {
            return Err(bad_item());
        }

        let command: Command = name.parse()?;
        let path = path.to_string();
        let extra = fields.get(2).copied();

        match command {
            Command::Put => {
                let size = extra
                    .and_then(|s| s.parse::<u64>().ok())
                    .filter(|&n| n > 0)
                    .ok_or_else(|| malformed(text))?;
                Ok(Header::Put { path, size })
            }
            Command::Get => match extra {
                None => Ok(Header::Get {
                    path,
                    thumbnail: false,
                }),
                Some(THUMBNAIL_FLAG) => Ok(Header::Get {
                    path,
                    thumbnail: true,
                }),
                Some(_) => Err(malformed(text)),
            },
            Command::Del => match extra {
                None => Ok(Header::Del { path }),
                Some(_) => Err(malformed(text)),
            },
        }
    }
}

fn malformed(text: &str) -> ProtocolError {
    ProtocolError::MalformedHeader(format!("invalid header: {text}"))
}

/// Decodes a header line as UTF-8, falling back to Latin-1.
fn decode_line(line: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(line) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(line.iter().map(|&b| b as char).collect()),
    }
}

/// Rejects characters reserved by the header framing.
fn validate_path_chars(path: &str) -> Result<(), ProtocolError> {
    if let Some(c) = path.chars().find(|c| matches!(c, '\t' | '\n' | '\r' | ':')) {
        return Err(ProtocolError::MalformedHeader(format!(
            "path contains reserved character {c:?}: {path}"
        )));
    }
    Ok(())
}
