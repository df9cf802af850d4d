//! RESP Record Framing
//!
//! Commands are journaled as RESP arrays of bulk strings:
//!
//! ```text
//! *3\r\n$3\r\nSET\r\n$5\r\nmykey\r\n$7\r\nmyvalue\r\n
//! ```
//!
//! Bulk payloads are opaque bytes; only the `*`/`$` headers are text.

use std::io::{BufRead, ErrorKind};

use bytes::{BufMut, Bytes, BytesMut};

use super::WalError;

/// Encode a command tuple as a RESP array of bulk strings
pub fn encode_record<S: AsRef<[u8]>>(parts: &[S]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_slice(format!("*{}\r\n", parts.len()).as_bytes());

    for part in parts {
        let bytes = part.as_ref();
        buf.put_slice(format!("${}\r\n", bytes.len()).as_bytes());
        buf.put_slice(bytes);
        buf.put_slice(b"\r\n");
    }

    buf.freeze()
}

/// Decode one record from the stream.
///
/// Returns `Ok(None)` on a clean end of stream and, likewise, when the
/// stream ends mid-record: a torn tail from a crash is treated as absent.
/// Structurally invalid bytes with data still behind them are corruption
/// and fail the decode.
pub fn decode_record<R: BufRead>(reader: &mut R) -> Result<Option<Vec<Bytes>>, WalError> {
    let header = match read_line(reader)? {
        LineRead::Eof | LineRead::Truncated => return Ok(None),
        LineRead::Line(line) => line,
    };

    let count = header
        .strip_prefix('*')
        .and_then(|n| n.parse::<usize>().ok())
        .ok_or_else(|| WalError::Corrupt(format!("expected array header, got {header:?}")))?;

    let mut parts = Vec::with_capacity(count);

    for _ in 0..count {
        let bulk_header = match read_line(reader)? {
            LineRead::Eof | LineRead::Truncated => return Ok(None),
            LineRead::Line(line) => line,
        };

        let len = bulk_header
            .strip_prefix('$')
            .and_then(|n| n.parse::<usize>().ok())
            .ok_or_else(|| {
                WalError::Corrupt(format!("expected bulk string header, got {bulk_header:?}"))
            })?;

        // Bulk payloads may contain CR/LF, so read the declared byte count
        // exactly plus the trailing terminator.
        let mut data = vec![0u8; len + 2];
        if let Err(err) = reader.read_exact(&mut data) {
            if err.kind() == ErrorKind::UnexpectedEof {
                return Ok(None);
            }
            return Err(WalError::Io(err));
        }

        if &data[len..] != b"\r\n" {
            return Err(WalError::Corrupt(format!(
                "bulk string length mismatch, declared {len}"
            )));
        }
        data.truncate(len);

        parts.push(Bytes::from(data));
    }

    Ok(Some(parts))
}

enum LineRead {
    Line(String),
    /// Stream ended before the line terminator
    Truncated,
    Eof,
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<LineRead, WalError> {
    let mut buf = Vec::new();
    let n = reader.read_until(b'\n', &mut buf)?;

    if n == 0 {
        return Ok(LineRead::Eof);
    }
    if !buf.ends_with(b"\n") {
        return Ok(LineRead::Truncated);
    }
    if !buf.ends_with(b"\r\n") {
        return Err(WalError::Corrupt("header missing CRLF terminator".into()));
    }

    buf.truncate(buf.len() - 2);
    String::from_utf8(buf)
        .map(LineRead::Line)
        .map_err(|_| WalError::Corrupt("header is not valid UTF-8".into()))
}
