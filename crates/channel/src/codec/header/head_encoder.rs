//! Encoder for HTTP response heads.
//!
//! Writes the status line, the application headers and the framing headers
//! matching the [`BodyFraming`] chosen for the body. Header names are written
//! the way `http::HeaderName` stores them, in lowercase.

use std::io::{self, ErrorKind, Write};

use bytes::{BufMut, BytesMut};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{StatusCode, Version};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::{BodyFraming, ResponseHead, SendError, protocol_str};

/// Initial buffer size reserved for a response head
const INIT_HEADER_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeadEncoder;

impl Encoder<(&ResponseHead, BodyFraming)> for HeadEncoder {
    type Error = SendError;

    /// Encodes `head` followed by the framing headers into `dst`.
    ///
    /// Application supplied `Content-Length` and `Transfer-Encoding` headers are
    /// replaced by the ones describing `framing`:
    /// - `Length(n)`: `content-length: n`
    /// - `Chunked`: `transfer-encoding: chunked`
    /// - `UntilClose`: neither
    /// - `Empty`: `content-length: 0`, except for statuses that never carry a body
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP version is neither 1.0 nor 1.1
    fn encode(&mut self, item: (&ResponseHead, BodyFraming), dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (head, framing) = item;

        let version = head.version();
        if version != Version::HTTP_11 && version != Version::HTTP_10 {
            error!(http_version = ?version, "unsupported http version");
            return Err(io::Error::from(ErrorKind::Unsupported).into());
        }

        dst.reserve(INIT_HEADER_SIZE);
        let status = head.status();
        write!(
            (&mut *dst).writer(),
            "{} {} {}\r\n",
            protocol_str(version),
            status.as_str(),
            status.canonical_reason().unwrap_or("")
        )?;

        for (name, value) in head.headers().iter() {
            if name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
                continue;
            }
            put_header(dst, name.as_ref(), value.as_bytes());
        }

        match framing {
            BodyFraming::Length(n) => write!((&mut *dst).writer(), "content-length: {n}\r\n")?,
            BodyFraming::Chunked => put_header(dst, b"transfer-encoding", b"chunked"),
            BodyFraming::UntilClose => {}
            BodyFraming::Empty if never_has_body(status) => {}
            BodyFraming::Empty => put_header(dst, b"content-length", b"0"),
        }

        dst.put_slice(b"\r\n");
        Ok(())
    }
}

#[inline]
fn put_header(dst: &mut BytesMut, name: &[u8], value: &[u8]) {
    dst.put_slice(name);
    dst.put_slice(b": ");
    dst.put_slice(value);
    dst.put_slice(b"\r\n");
}

fn never_has_body(status: StatusCode) -> bool {
    status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED
}
