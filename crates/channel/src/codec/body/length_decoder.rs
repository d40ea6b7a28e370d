//! Decoder for bodies framed by `Content-Length`.
//!
//! refer: <https://www.rfc-editor.org/rfc/rfc9112.html#name-content-length>

use std::cmp;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::{ParseError, PayloadItem};

/// Yields exactly `length` bytes, then [`PayloadItem::Eof`].
///
/// Bytes after the body stay in the source buffer, they belong to the next
/// request on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthDecoder {
    length: u64,
    remaining: u64,
}

impl LengthDecoder {
    pub fn new(length: u64) -> Self {
        Self { length, remaining: length }
    }

    pub fn is_finished(&self) -> bool {
        self.remaining == 0
    }
}

impl Decoder for LengthDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.remaining == 0 {
            return Ok(Some(PayloadItem::Eof));
        }

        if src.is_empty() {
            return Ok(None);
        }

        let len = cmp::min(self.remaining, src.len() as u64);
        let bytes = src.split_to(len as usize).freeze();

        self.remaining -= bytes.len() as u64;
        Ok(Some(PayloadItem::Chunk(bytes)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(ParseError::truncated_body(self.length, self.length - self.remaining)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic() {
        let mut buffer = BytesMut::from(&b"101234567890abcdef\r\n\r\n"[..]);

        let mut length_decoder = LengthDecoder::new(10);
        let payload = length_decoder.decode(&mut buffer).unwrap().unwrap();
        assert!(payload.is_chunk());

        let bytes = payload.as_bytes().unwrap();
        assert_eq!(&bytes[..], b"1012345678");
        assert_eq!(&buffer[..], b"90abcdef\r\n\r\n");

        assert!(length_decoder.is_finished());
        assert!(length_decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn test_split_delivery() {
        let mut decoder = LengthDecoder::new(4);
        let mut buffer = BytesMut::from(&b"12"[..]);

        assert_eq!(decoder.decode(&mut buffer).unwrap().unwrap().as_bytes().unwrap(), &b"12"[..]);
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"34GET");
        assert_eq!(decoder.decode(&mut buffer).unwrap().unwrap().as_bytes().unwrap(), &b"34"[..]);
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert_eq!(&buffer[..], b"GET");
    }

    #[test]
    fn test_truncated_at_eof() {
        let mut decoder = LengthDecoder::new(4);
        let mut buffer = BytesMut::from(&b"12"[..]);

        decoder.decode_eof(&mut buffer).unwrap();
        let error = decoder.decode_eof(&mut buffer).unwrap_err();
        assert!(matches!(error, ParseError::TruncatedBody { received: 2, .. }));
    }
}
