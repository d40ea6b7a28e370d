//! In-memory byte stream.
//!
//! A [`ByteStream`] is the boundary between a transport and the channels of one
//! connection: the transport appends what it read to the input half and drains
//! the output half, each half carrying its own close signal. Closing a half is
//! independent of whether bytes are still buffered in it.

use bytes::{Bytes, BytesMut};

use crate::protocol::SendError;

#[derive(Debug, Default)]
pub struct ByteStream {
    input: BytesMut,
    input_closed: bool,
    output: BytesMut,
    output_closed: bool,
}

impl ByteStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { input: BytesMut::with_capacity(capacity), output: BytesMut::with_capacity(capacity), ..Self::default() }
    }

    /// Appends bytes received from the peer.
    pub fn append_input(&mut self, bytes: &[u8]) -> Result<(), SendError> {
        if self.input_closed {
            return Err(SendError::io(std::io::ErrorKind::BrokenPipe));
        }
        self.input.extend_from_slice(bytes);
        Ok(())
    }

    /// The peer will not send anything more.
    pub fn close_input(&mut self) {
        self.input_closed = true;
    }

    pub fn is_input_closed(&self) -> bool {
        self.input_closed
    }

    /// Bytes received and not consumed by a channel yet.
    pub fn buffered_input(&self) -> &[u8] {
        &self.input
    }

    /// Appends bytes to send to the peer, dropped once the output is closed.
    pub fn append_output(&mut self, bytes: &[u8]) {
        if !self.output_closed {
            self.output.extend_from_slice(bytes);
        }
    }

    /// Nothing more will be written to the peer.
    pub fn close_output(&mut self) {
        self.output_closed = true;
    }

    pub fn is_output_closed(&self) -> bool {
        self.output_closed
    }

    /// Bytes written and not taken by the transport yet.
    pub fn pending_output(&self) -> &[u8] {
        &self.output
    }

    /// Takes every pending output byte, for the transport to write.
    pub fn take_output(&mut self) -> Bytes {
        self.output.split().freeze()
    }

    pub(crate) fn input_mut(&mut self) -> &mut BytesMut {
        &mut self.input
    }

    pub(crate) fn output_mut(&mut self) -> &mut BytesMut {
        &mut self.output
    }
}
