//! Decoder for request bodies.
//!
//! Picks the decoding strategy from the [`BodyFraming`] chosen for the request:
//! - Content-Length based payloads
//! - Chunked transfer encoding
//! - Payloads delimited by the close of the input
//! - No body

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::chunked_decoder::ChunkedDecoder;
use crate::codec::body::length_decoder::LengthDecoder;
use crate::protocol::{BodyFraming, ParseError, PayloadItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadDecoder {
    kind: Kind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Kind {
    Length(LengthDecoder),

    Chunked(ChunkedDecoder),

    /// everything until the input closes
    UntilClose,

    NoBody,
}

impl PayloadDecoder {
    pub fn empty() -> Self {
        Self { kind: Kind::NoBody }
    }

    pub fn chunked() -> Self {
        Self { kind: Kind::Chunked(ChunkedDecoder::new()) }
    }

    pub fn fix_length(size: u64) -> Self {
        Self { kind: Kind::Length(LengthDecoder::new(size)) }
    }

    pub fn until_close() -> Self {
        Self { kind: Kind::UntilClose }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self.kind, Kind::Chunked(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.kind, Kind::NoBody)
    }

    pub fn is_until_close(&self) -> bool {
        matches!(self.kind, Kind::UntilClose)
    }
}

impl From<BodyFraming> for PayloadDecoder {
    fn from(framing: BodyFraming) -> Self {
        match framing {
            BodyFraming::Length(size) => Self::fix_length(size),
            BodyFraming::Chunked => Self::chunked(),
            BodyFraming::UntilClose => Self::until_close(),
            BodyFraming::Empty => Self::empty(),
        }
    }
}

impl Decoder for PayloadDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode(src),
            Kind::UntilClose if src.is_empty() => Ok(None),
            Kind::UntilClose => Ok(Some(PayloadItem::Chunk(src.split().freeze()))),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }

    /// Called once the input is closed.
    ///
    /// A close-delimited body ends here, length and chunked bodies that have
    /// not ended yet fail with [`ParseError::TruncatedBody`].
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match &mut self.kind {
            Kind::Length(length_decoder) => length_decoder.decode_eof(src),
            Kind::Chunked(chunked_decoder) => chunked_decoder.decode_eof(src),
            Kind::UntilClose if src.is_empty() => Ok(Some(PayloadItem::Eof)),
            Kind::UntilClose => Ok(Some(PayloadItem::Chunk(src.split().freeze()))),
            Kind::NoBody => Ok(Some(PayloadItem::Eof)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn until_close_ends_with_input() {
        let mut decoder = PayloadDecoder::from(BodyFraming::UntilClose);
        let mut buffer = BytesMut::from(&b"abc"[..]);

        assert_eq!(decoder.decode(&mut buffer).unwrap().unwrap().as_bytes().unwrap(), &b"abc"[..]);
        assert!(decoder.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(b"de");
        assert_eq!(decoder.decode_eof(&mut buffer).unwrap().unwrap().as_bytes().unwrap(), &b"de"[..]);
        assert!(decoder.decode_eof(&mut buffer).unwrap().unwrap().is_eof());
    }

    #[test]
    fn empty_body_leaves_input() {
        let mut decoder = PayloadDecoder::from(BodyFraming::Empty);
        let mut buffer = BytesMut::from(&b"GET / HTTP/1.1\r\n"[..]);

        assert!(decoder.is_empty());
        assert!(decoder.decode(&mut buffer).unwrap().unwrap().is_eof());
        assert_eq!(buffer.len(), 16);
    }

    #[test]
    fn framing_selects_kind() {
        assert!(PayloadDecoder::from(BodyFraming::Chunked).is_chunked());
        assert!(PayloadDecoder::from(BodyFraming::UntilClose).is_until_close());
        assert_eq!(PayloadDecoder::from(BodyFraming::Length(3)), PayloadDecoder::fix_length(3));
    }
}
