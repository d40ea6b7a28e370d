//! Decoder for the chunked transfer coding.
//!
//! refer: <https://www.rfc-editor.org/rfc/rfc9112.html#name-chunked-transfer-coding>
//!
//! Chunk extensions and trailer fields are consumed and dropped. Line ends
//! inside the coding may be `\r\n` or a bare `\n`.

use std::task::Poll;

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::protocol::{ParseError, PayloadItem};
use ChunkedState::*;

/// A decoder for chunked request bodies.
///
/// Chunk data is yielded as soon as any of it is buffered, so a large chunk
/// may come out as several [`PayloadItem::Chunk`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    state: ChunkedState,
    remaining_size: u64,
    received: u64,
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: Size, remaining_size: 0, received: 0 }
    }

    /// Whether the terminating zero sized chunk and trailers were consumed.
    pub fn is_finished(&self) -> bool {
        self.state == End
    }
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// hex digits of the chunk size
    Size,
    /// whitespace after the size
    SizeLws,
    /// `;` extensions up to the end of the size line
    Extension,
    /// `\n` ending the size line
    SizeLf,
    Body,
    /// line end after chunk data
    BodyCr,
    BodyLf,
    /// a trailer field line
    Trailer,
    TrailerLf,
    /// line end of the empty line closing the body
    EndCr,
    EndLf,
    End,
}

impl Decoder for ChunkedDecoder {
    type Item = PayloadItem;
    type Error = ParseError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if self.state == End {
                trace!(received = self.received, "finished reading chunked data");
                return Ok(Some(PayloadItem::Eof));
            }

            if src.is_empty() {
                return Ok(None);
            }

            let mut buf = None;
            self.state = match self.state.step(src, &mut self.remaining_size, &mut buf) {
                Poll::Pending => return Ok(None),
                Poll::Ready(state) => state?,
            };

            if let Some(bytes) = buf {
                trace!(len = bytes.len(), "read chunked bytes");
                self.received += bytes.len() as u64;
                return Ok(Some(PayloadItem::Chunk(bytes)));
            }
        }
    }

    /// The input closed: anything short of the final chunk is a truncated body.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(item) => Ok(Some(item)),
            None => Err(ParseError::truncated_body("chunked", self.received)),
        }
    }
}

macro_rules! try_next_byte {
    ($src:ident) => {{
        if $src.is_empty() {
            return Poll::Pending;
        }
        $src.get_u8()
    }};
}

type Step = Poll<Result<ChunkedState, ParseError>>;

fn invalid(reason: &str) -> Step {
    Poll::Ready(Err(ParseError::invalid_body(format!("chunked coding: {reason}"))))
}

impl ChunkedState {
    fn step(self, src: &mut BytesMut, remaining_size: &mut u64, buf: &mut Option<Bytes>) -> Step {
        match self {
            Size => Self::read_size(src, remaining_size),
            SizeLws => Self::read_size_lws(src, *remaining_size),
            Extension => Self::read_extension(src, *remaining_size),
            SizeLf => Self::read_size_lf(src, *remaining_size),
            Body => Self::read_body(src, remaining_size, buf),
            BodyCr => Self::read_body_cr(src),
            BodyLf => Self::read_body_lf(src),
            Trailer => Self::read_trailer(src),
            TrailerLf => Self::read_trailer_lf(src),
            EndCr => Self::read_end_cr(src),
            EndLf => Self::read_end_lf(src),
            End => Poll::Ready(Ok(End)),
        }
    }

    fn after_size_line(size: u64) -> Step {
        Poll::Ready(Ok(if size == 0 { EndCr } else { Body }))
    }

    fn read_size(src: &mut BytesMut, size: &mut u64) -> Step {
        let digit = match try_next_byte!(src) {
            b @ b'0'..=b'9' => b - b'0',
            b @ b'a'..=b'f' => b + 10 - b'a',
            b @ b'A'..=b'F' => b + 10 - b'A',
            b'\t' | b' ' => return Poll::Ready(Ok(SizeLws)),
            b';' => return Poll::Ready(Ok(Extension)),
            b'\r' => return Poll::Ready(Ok(SizeLf)),
            b'\n' => return Self::after_size_line(*size),
            _ => return invalid("invalid chunk size"),
        };

        match size.checked_mul(16).and_then(|size| size.checked_add(u64::from(digit))) {
            Some(new_size) => {
                *size = new_size;
                Poll::Ready(Ok(Size))
            }
            None => invalid("chunk size overflow"),
        }
    }

    fn read_size_lws(src: &mut BytesMut, size: u64) -> Step {
        match try_next_byte!(src) {
            b'\t' | b' ' => Poll::Ready(Ok(SizeLws)),
            b';' => Poll::Ready(Ok(Extension)),
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => Self::after_size_line(size),
            _ => invalid("invalid whitespace after chunk size"),
        }
    }

    fn read_extension(src: &mut BytesMut, size: u64) -> Step {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(SizeLf)),
            b'\n' => Self::after_size_line(size),
            _ => Poll::Ready(Ok(Extension)),
        }
    }

    fn read_size_lf(src: &mut BytesMut, size: u64) -> Step {
        match try_next_byte!(src) {
            b'\n' => Self::after_size_line(size),
            _ => invalid("missing LF after chunk size"),
        }
    }

    fn read_body(src: &mut BytesMut, remaining_size: &mut u64, buf: &mut Option<Bytes>) -> Step {
        if *remaining_size == 0 {
            return Poll::Ready(Ok(BodyCr));
        }

        let read_size = usize::try_from(*remaining_size).unwrap_or(usize::MAX).min(src.len());
        *remaining_size -= read_size as u64;
        *buf = Some(src.split_to(read_size).freeze());

        Poll::Ready(Ok(if *remaining_size > 0 { Body } else { BodyCr }))
    }

    fn read_body_cr(src: &mut BytesMut) -> Step {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(BodyLf)),
            b'\n' => Poll::Ready(Ok(Size)),
            _ => invalid("missing line end after chunk data"),
        }
    }

    fn read_body_lf(src: &mut BytesMut) -> Step {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(Size)),
            _ => invalid("missing LF after chunk data"),
        }
    }

    fn read_trailer(src: &mut BytesMut) -> Step {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(TrailerLf)),
            b'\n' => Poll::Ready(Ok(EndCr)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_trailer_lf(src: &mut BytesMut) -> Step {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(EndCr)),
            _ => invalid("missing LF after trailer"),
        }
    }

    fn read_end_cr(src: &mut BytesMut) -> Step {
        match try_next_byte!(src) {
            b'\r' => Poll::Ready(Ok(EndLf)),
            b'\n' => Poll::Ready(Ok(End)),
            _ => Poll::Ready(Ok(Trailer)),
        }
    }

    fn read_end_lf(src: &mut BytesMut) -> Step {
        match try_next_byte!(src) {
            b'\n' => Poll::Ready(Ok(End)),
            _ => invalid("missing final LF"),
        }
    }
}
