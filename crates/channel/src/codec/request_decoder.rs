//! Decoder for one HTTP request: the head, then its body.
//!
//! The decoder yields `Message::Header((RequestHead, BodyFraming))` once the
//! head is complete, followed by `Message::Payload` items until the body ends
//! with [`PayloadItem::Eof`]. After that it is ready for the next head.

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::codec::body::PayloadDecoder;
use crate::codec::header::HeadDecoder;
use crate::config::ChannelConfig;
use crate::protocol::{BodyFraming, Message, ParseError, PayloadItem, RequestHead};

#[derive(Debug)]
pub struct RequestDecoder {
    head_decoder: HeadDecoder,
    payload_decoder: Option<PayloadDecoder>,
}

impl RequestDecoder {
    pub fn new(config: &ChannelConfig) -> Self {
        Self { head_decoder: HeadDecoder::new(config), payload_decoder: None }
    }

    /// Whether the decoder is inside a body.
    pub fn is_decoding_body(&self) -> bool {
        self.payload_decoder.is_some()
    }

    /// Whether part of a head has been consumed.
    pub fn is_decoding_head(&self) -> bool {
        self.payload_decoder.is_none() && self.head_decoder.has_started()
    }

    /// Whether the request line is done and header lines are being read.
    pub fn is_parsing_headers(&self) -> bool {
        self.payload_decoder.is_none() && self.head_decoder.is_parsing_headers()
    }

    fn on_payload(&mut self, item: Option<PayloadItem>) -> Option<Message<(RequestHead, BodyFraming)>> {
        let item = item?;
        if item.is_eof() {
            // no need payload decoder in this request now
            self.payload_decoder.take();
        }
        Some(Message::Payload(item))
    }

    fn on_head(&mut self, head: Option<(RequestHead, BodyFraming)>) -> Option<Message<(RequestHead, BodyFraming)>> {
        let (head, framing) = head?;
        self.payload_decoder = Some(framing.into());
        Some(Message::Header((head, framing)))
    }
}

impl Default for RequestDecoder {
    fn default() -> Self {
        Self::new(&ChannelConfig::default())
    }
}

impl Decoder for RequestDecoder {
    type Item = Message<(RequestHead, BodyFraming)>;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // parse payload if have payload_decoder
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode(src)?;
            return Ok(self.on_payload(item));
        }

        let head = self.head_decoder.decode(src)?;
        Ok(self.on_head(head))
    }

    /// Called once the input is closed: ends a close-delimited body, reports a
    /// truncated one, and resolves a head whose last line ended in a bare `\r`.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(payload_decoder) = &mut self.payload_decoder {
            let item = payload_decoder.decode_eof(src)?;
            return Ok(self.on_payload(item));
        }

        let head = self.head_decoder.decode_eof(src)?;
        Ok(self.on_head(head))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn head_then_body_then_next_head() {
        let str = indoc! {r##"
        POST /submit HTTP/1.1
        Content-Length: 4

        1234GET / HTTP/1.1

        "##};
        let mut buf = BytesMut::from(str);
        let mut decoder = RequestDecoder::default();

        let Some(Message::Header((head, framing))) = decoder.decode(&mut buf).unwrap() else {
            panic!("expect head");
        };
        assert_eq!(head.target(), "/submit");
        assert_eq!(framing, BodyFraming::Length(4));
        assert!(decoder.is_decoding_body());

        let payload = decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap();
        assert_eq!(payload.as_bytes().unwrap(), &b"1234"[..]);
        assert!(decoder.decode(&mut buf).unwrap().unwrap().into_payload_item().unwrap().is_eof());
        assert!(!decoder.is_decoding_body());

        assert!(decoder.decode(&mut buf).unwrap().unwrap().is_header());
    }

    #[test]
    fn truncated_body_on_eof() {
        let mut buf = BytesMut::from("POST / HTTP/1.1\r\nContent-Length: 4\r\n\r\n12");
        let mut decoder = RequestDecoder::default();

        assert!(decoder.decode(&mut buf).unwrap().unwrap().is_header());
        assert!(decoder.decode(&mut buf).unwrap().unwrap().is_payload());
        assert!(decoder.decode(&mut buf).unwrap().is_none());

        let error = decoder.decode_eof(&mut buf).unwrap_err();
        assert!(error.is_truncated());
    }

    #[test]
    fn head_progress() {
        let mut decoder = RequestDecoder::default();
        let mut buf = BytesMut::from("GET / HT");

        assert!(!decoder.is_decoding_head());
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(decoder.is_decoding_head());
        assert!(!decoder.is_parsing_headers());

        buf.extend_from_slice(b"TP/1.1\r\nHost: a\r\n");
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert!(decoder.is_parsing_headers());
    }
}
