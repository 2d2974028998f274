//! Content-Length framed message transport.
//!
//! Messages are JSON bodies preceded by a `Content-Length: N` header and a
//! blank line, over any `Read`/`Write` pair; in production the tool
//! server's stdin/stdout.

use std::io::{BufRead, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{ProtocolError, Result};

/// Write one framed message.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let json = serde_json::to_string(message)?;
    write!(writer, "Content-Length: {}\r\n\r\n", json.len())?;
    write!(writer, "{json}")?;
    writer.flush()?;

    tracing::trace!(content_length = json.len(), "sent message");
    Ok(())
}

/// Read one framed message.
///
/// Returns `None` on a clean EOF before any header byte (the peer hung
/// up). EOF mid-frame is an error.
pub fn read_message<R: BufRead, T: DeserializeOwned>(reader: &mut R) -> Result<Option<T>> {
    let mut content_length: Option<usize> = None;
    let mut line = String::new();
    let mut any_header = false;

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line)?;

        if bytes_read == 0 {
            if any_header {
                return Err(ProtocolError::protocol("EOF inside message headers"));
            }
            return Ok(None);
        }
        any_header = true;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            break;
        }
        if let Some(len_str) = trimmed.strip_prefix("Content-Length:") {
            content_length = Some(
                len_str
                    .trim()
                    .parse()
                    .map_err(|e| ProtocolError::protocol(format!("invalid Content-Length: {e}")))?,
            );
        }
    }

    let content_length =
        content_length.ok_or_else(|| ProtocolError::protocol("missing Content-Length header"))?;

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body)?;

    let json = String::from_utf8(body)
        .map_err(|e| ProtocolError::protocol(format!("invalid UTF-8 in message: {e}")))?;

    tracing::trace!(content_length, "received message");
    Ok(Some(serde_json::from_str(&json)?))
}
