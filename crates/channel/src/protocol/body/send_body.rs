use std::collections::VecDeque;

use bytes::Bytes;

use crate::protocol::SendError;

/// The writable side of a response body.
///
/// Data is queued until the channel flushes it; closing the body fixes its
/// total length, which lets the codec announce a `Content-Length`.
#[derive(Debug, Default)]
pub struct SendBody {
    queue: VecDeque<Bytes>,
    queued: usize,
    total: u64,
    closed: bool,
}

impl SendBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `data` behind everything appended before.
    pub fn append(&mut self, data: impl Into<Bytes>) -> Result<(), SendError> {
        if self.closed {
            return Err(SendError::BodyClosed);
        }

        let data = data.into();
        if data.is_empty() {
            return Ok(());
        }

        self.queued += data.len();
        self.total += data.len() as u64;
        self.queue.push_back(data);
        Ok(())
    }

    /// Signals that no more data will be appended.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes appended but not flushed yet.
    pub fn queued_len(&self) -> usize {
        self.queued
    }

    /// Bytes appended since the body was created.
    pub fn total_len(&self) -> u64 {
        self.total
    }

    pub(crate) fn pop(&mut self) -> Option<Bytes> {
        let bytes = self.queue.pop_front()?;
        self.queued -= bytes.len();
        Some(bytes)
    }
}
