//! Encoder for one HTTP response: the head, then its body.

use bytes::{Buf, BytesMut};
use std::io;
use std::io::ErrorKind;
use tokio_util::codec::Encoder;
use tracing::error;

use crate::codec::body::PayloadEncoder;
use crate::codec::header::HeadEncoder;
use crate::protocol::{BodyFraming, Message, ResponseHead, SendError};

/// Encodes `Message::Header((&ResponseHead, BodyFraming))` followed by
/// `Message::Payload` items.
///
/// The framing passed with the head is announced in the head and applied to
/// the payload. A response to a `HEAD` request announces it the same way but
/// writes no body bytes, see [`ResponseEncoder::without_body`].
#[derive(Debug, Default)]
pub struct ResponseEncoder {
    head_encoder: HeadEncoder,
    payload_encoder: Option<PayloadEncoder>,
    without_body: bool,
    finished: bool,
}

impl ResponseEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// An encoder for responses to `HEAD` requests.
    pub fn without_body() -> Self {
        Self { without_body: true, ..Self::default() }
    }

    /// The head has been encoded.
    pub fn is_started(&self) -> bool {
        self.payload_encoder.is_some() || self.finished
    }

    /// The end of the body has been encoded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl<D: Buf> Encoder<Message<(&ResponseHead, BodyFraming), D>> for ResponseEncoder {
    type Error = SendError;

    fn encode(&mut self, item: Message<(&ResponseHead, BodyFraming), D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Message::Header((head, framing)) => {
                if self.is_started() {
                    error!("expect payload item but receive response head");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                }

                let payload_encoder = if self.without_body { PayloadEncoder::empty() } else { framing.into() };
                self.payload_encoder = Some(payload_encoder);
                self.head_encoder.encode((head, framing), dst)
            }

            Message::Payload(payload_item) => {
                let Some(payload_encoder) = &mut self.payload_encoder else {
                    error!("expect response head but receive payload item");
                    return Err(io::Error::from(ErrorKind::InvalidInput).into());
                };

                let result = payload_encoder.encode(payload_item, dst);
                if payload_encoder.is_finish() {
                    self.payload_encoder.take();
                    self.finished = true;
                }
                result
            }
        }
    }
}
