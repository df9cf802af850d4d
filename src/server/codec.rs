//! Line Codec
//!
//! CRLF-terminated request lines in, raw pre-framed reply bytes out.
//! Lines are handed up as raw bytes; values on the wire are opaque and
//! only command verbs are interpreted as text.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Tokio codec for the Redis line protocol
#[derive(Debug, Default)]
pub struct LineCodec;

impl Decoder for LineCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(pos) = src.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };

        let mut line = src.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }

        Ok(Some(line.freeze()))
    }
}

impl Encoder<Bytes> for LineCodec {
    type Error = io::Error;

    // Replies carry their own framing (`+OK\r\n`, `-ERR …\r\n`)
    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.put_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_crlf_line() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from(&b"SET foo bar\r\nGET foo\r\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "SET foo bar");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "GET foo");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_decode_bare_newline() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from(&b"DEL foo\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "DEL foo");
    }

    #[test]
    fn test_decode_is_binary_safe() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from(&b"SET k \xff\xfe\x01\r\n"[..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap().as_ref(),
            b"SET k \xff\xfe\x01"
        );
    }

    #[test]
    fn test_decode_waits_for_terminator() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::from(&b"SET fo"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.put_slice(b"o bar\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap(), "SET foo bar");
    }

    #[test]
    fn test_encode_passthrough() {
        let mut codec = LineCodec;
        let mut buf = BytesMut::new();
        codec
            .encode(Bytes::from_static(b"+OK\r\n"), &mut buf)
            .unwrap();
        assert_eq!(buf.as_ref(), b"+OK\r\n");
    }
}
