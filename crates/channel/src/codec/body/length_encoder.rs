//! Encoder for bodies framed by `Content-Length`.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Encoder;
use tracing::warn;

use crate::protocol::{PayloadItem, SendError};

/// Writes body bytes as they are, checking them against the announced length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LengthEncoder {
    length: u64,
    remaining: u64,
    eof: bool,
}

impl LengthEncoder {
    pub fn new(length: u64) -> Self {
        Self { length, remaining: length, eof: false }
    }

    pub fn is_finish(&self) -> bool {
        self.eof
    }
}

impl<D: Buf> Encoder<PayloadItem<D>> for LengthEncoder {
    type Error = SendError;

    /// # Errors
    ///
    /// Returns `SendError::InvalidBody` when a chunk exceeds the announced
    /// length, or when the body ends before the announced length was written.
    fn encode(&mut self, item: PayloadItem<D>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if self.eof {
            warn!("encode payload_item but no need to encode anymore");
            return Ok(());
        }

        match item {
            PayloadItem::Chunk(bytes) => {
                let len = bytes.remaining() as u64;
                if len > self.remaining {
                    return Err(SendError::invalid_body(format!(
                        "body longer than content-length {}, {} bytes over",
                        self.length,
                        len - self.remaining
                    )));
                }
                self.remaining -= len;
                dst.put(bytes);
                Ok(())
            }
            PayloadItem::Eof => {
                if self.remaining > 0 {
                    return Err(SendError::invalid_body(format!(
                        "body shorter than content-length {}, {} bytes missing",
                        self.length, self.remaining
                    )));
                }
                self.eof = true;
                Ok(())
            }
        }
    }
}
