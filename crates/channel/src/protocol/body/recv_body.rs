use std::io;
use std::task::Poll;

use bytes::{Buf, Bytes, BytesMut};

use crate::protocol::ParseError;

/// The readable side of a request body.
///
/// Bytes are pushed by the channel as the payload decoder produces them; the
/// body closes itself exactly when the framing says the body is over, or
/// records the framing error that ended it early.
#[derive(Debug, Default)]
pub struct RecvBody {
    buf: BytesMut,
    received: u64,
    closed: bool,
    truncated: bool,
    error: Option<ParseError>,
    // a line ended with `\r` at the end of the buffer, drop a following `\n`
    skip_lf: bool,
}

impl RecvBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, bytes: &Bytes) {
        self.received += bytes.len() as u64;
        self.buf.extend_from_slice(bytes);
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    pub(crate) fn fail(&mut self, error: ParseError) {
        self.truncated = error.is_truncated();
        self.error = Some(error);
        self.closed = true;
    }

    /// Number of bytes buffered and not read yet.
    pub fn available(&self) -> usize {
        self.buf.len()
    }

    /// Total body bytes received so far.
    pub fn received_len(&self) -> u64 {
        self.received
    }

    /// No more bytes will be added to this body.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Closed and everything has been read.
    pub fn is_drained(&self) -> bool {
        self.closed && self.buf.is_empty()
    }

    /// The input closed before the framed length was received.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// The framing error that closed this body, until a read reports it.
    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    /// Takes every buffered byte.
    pub fn read_all(&mut self) -> Bytes {
        self.skip_lf = false;
        self.buf.split().freeze()
    }

    /// Reads the next line, accepting `\n`, `\r\n` and a bare `\r` as terminators.
    ///
    /// Returns `Poll::Pending` while no full line is buffered and the body is still
    /// open, and `Ready(Ok(None))` once the body is closed and drained.
    pub fn poll_line(&mut self) -> Poll<Result<Option<String>, ParseError>> {
        if self.skip_lf && !self.buf.is_empty() {
            self.skip_lf = false;
            if self.buf[0] == b'\n' {
                self.buf.advance(1);
            }
        }

        match self.buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
            Some(index) => {
                let line = self.buf.split_to(index);
                let terminator = self.buf[0];
                self.buf.advance(1);

                if terminator == b'\r' {
                    match self.buf.first() {
                        Some(b'\n') => self.buf.advance(1),
                        Some(_) => {}
                        None => self.skip_lf = true,
                    }
                }
                Poll::Ready(into_line(line).map(Some))
            }

            None if !self.closed => Poll::Pending,

            None if !self.buf.is_empty() => {
                let line = self.buf.split();
                Poll::Ready(into_line(line).map(Some))
            }

            None => match self.error.take() {
                Some(e) => Poll::Ready(Err(e)),
                None => Poll::Ready(Ok(None)),
            },
        }
    }
}

fn into_line(line: BytesMut) -> Result<String, ParseError> {
    String::from_utf8(line.to_vec()).map_err(|e| ParseError::invalid_body(format!("line is not utf8: {e}")))
}

impl io::Read for RecvBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.buf.is_empty() {
            if !self.closed {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            return match self.error.take() {
                Some(e) => Err(io::Error::new(io::ErrorKind::UnexpectedEof, e.to_string())),
                None => Ok(0),
            };
        }

        self.skip_lf = false;
        let len = buf.len().min(self.buf.len());
        self.buf.copy_to_slice(&mut buf[..len]);
        Ok(len)
    }
}
