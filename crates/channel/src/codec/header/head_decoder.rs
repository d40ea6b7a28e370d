//! Incremental decoder for HTTP request heads.
//!
//! The decoder consumes the request line and header lines from a [`BytesMut`]
//! buffer and can be resumed at any byte boundary: a line that is not complete
//! yet is kept inside the decoder, so delivering a head one byte at a time
//! yields exactly the same result as delivering it in one piece.
//!
//! # Grammar
//!
//! - Lines end with `\r\n`, `\n` or a bare `\r`
//! - Request line: `METHOD SP TARGET SP PROTOCOL`, tokens separated by runs of
//!   spaces or tabs; empty lines before it are skipped
//! - Header line: `NAME ":" [WS] VALUE`, the value is trimmed
//! - A line starting with a space or tab continues the previous header: its
//!   trimmed content is joined to the value with a single space
//! - An empty line ends the head
//!
//! # Limits
//!
//! - Maximum number of headers: [`ChannelConfig::max_headers`]
//! - Maximum head size: [`ChannelConfig::max_header_bytes`]
//!
//! Besides the structured [`RequestHead`] the decoder records the raw head. The
//! raw copy keeps every byte except for folded headers, where the terminator
//! before a continuation becomes one space, the continuation's indentation is
//! dropped and the removed bytes are re-emitted as spaces before the final
//! terminator, so the copy keeps the length of the input.

use bytes::{Buf, BufMut, BytesMut};
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderName, HeaderValue, Method, Version};
use tokio_util::codec::Decoder;
use tracing::trace;

use crate::config::ChannelConfig;
use crate::ensure;
use crate::protocol::{BodyFraming, HeaderTable, ParseError, RequestHead};

/// Decoder for HTTP request heads implementing the [`Decoder`] trait.
///
/// Produces the [`RequestHead`] together with the [`BodyFraming`] selected from
/// its headers, and leaves every byte after the head in the source buffer.
#[derive(Debug)]
pub struct HeadDecoder {
    max_header_bytes: usize,
    max_headers: usize,
    state: HeadState,
    line: BytesMut,
    saw_cr: bool,
    consumed: usize,
    raw: BytesMut,
    request_line: Option<RequestLine>,
    pending: Option<PendingHeader>,
    headers: HeaderTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadState {
    RequestLine,
    Headers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    Lf,
    CrLf,
    Cr,
}

impl Terminator {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            Terminator::Lf => b"\n",
            Terminator::CrLf => b"\r\n",
            Terminator::Cr => b"\r",
        }
    }
}

#[derive(Debug)]
struct RequestLine {
    method: Method,
    target: String,
    version: Version,
}

/// The last header line seen, kept open until the next line shows it is not folded.
#[derive(Debug)]
struct PendingHeader {
    name: HeaderName,
    value: BytesMut,
    raw: BytesMut,
    pad: usize,
    terminator: Terminator,
}

impl HeadDecoder {
    pub fn new(config: &ChannelConfig) -> Self {
        Self {
            max_header_bytes: config.max_header_bytes(),
            max_headers: config.max_headers(),
            state: HeadState::RequestLine,
            line: BytesMut::new(),
            saw_cr: false,
            consumed: 0,
            raw: BytesMut::new(),
            request_line: None,
            pending: None,
            headers: HeaderTable::new(),
        }
    }

    /// Whether any byte of a request has been consumed.
    pub fn has_started(&self) -> bool {
        self.request_line.is_some() || !self.line.is_empty() || self.saw_cr
    }

    /// Whether the request line is done and header lines are being read.
    pub fn is_parsing_headers(&self) -> bool {
        self.state == HeadState::Headers
    }

    fn consume(&mut self, len: usize) -> Result<(), ParseError> {
        self.consumed += len;
        ensure!(self.consumed <= self.max_header_bytes, ParseError::too_large_header(self.consumed, self.max_header_bytes));
        Ok(())
    }

    /// Moves the bytes of the current line from `src` into `self.line`.
    ///
    /// Returns the terminator once the line is complete; a `\r` at the end of the
    /// buffer needs one more byte to tell `\r\n` from a bare `\r`.
    fn next_line(&mut self, src: &mut BytesMut) -> Result<Option<Terminator>, ParseError> {
        loop {
            if self.saw_cr {
                let Some(&next) = src.first() else {
                    return Ok(None);
                };

                self.saw_cr = false;
                if next == b'\n' {
                    self.consume(1)?;
                    src.advance(1);
                    return Ok(Some(Terminator::CrLf));
                }
                return Ok(Some(Terminator::Cr));
            }

            match src.iter().position(|b| *b == b'\r' || *b == b'\n') {
                None => {
                    self.consume(src.len())?;
                    self.line.extend_from_slice(src);
                    src.clear();
                    return Ok(None);
                }
                Some(index) => {
                    self.consume(index + 1)?;
                    let terminator = src[index];
                    self.line.extend_from_slice(&src[..index]);
                    src.advance(index + 1);

                    if terminator == b'\n' {
                        return Ok(Some(Terminator::Lf));
                    }
                    self.saw_cr = true;
                }
            }
        }
    }

    fn on_line(&mut self, terminator: Terminator) -> Result<Option<(RequestHead, BodyFraming)>, ParseError> {
        let line = self.line.split();

        match self.state {
            HeadState::RequestLine => {
                if line.is_empty() {
                    trace!("skip empty line before request line");
                    return Ok(None);
                }

                self.request_line = Some(parse_request_line(&line)?);
                self.raw.extend_from_slice(&line);
                self.raw.extend_from_slice(terminator.as_bytes());
                self.state = HeadState::Headers;
                Ok(None)
            }

            HeadState::Headers if line.is_empty() => {
                self.commit_pending()?;
                self.raw.extend_from_slice(terminator.as_bytes());
                self.finish().map(Some)
            }

            HeadState::Headers if is_space(line[0]) => match self.pending.as_mut() {
                Some(pending) => {
                    pending.fold(&line, terminator);
                    Ok(None)
                }
                None => Err(ParseError::invalid_header("continuation line without a preceding header")),
            },

            HeadState::Headers => {
                self.commit_pending()?;
                self.pending = Some(PendingHeader::parse(line, terminator)?);
                Ok(None)
            }
        }
    }

    fn commit_pending(&mut self) -> Result<(), ParseError> {
        let Some(PendingHeader { name, value, raw, pad, terminator }) = self.pending.take() else {
            return Ok(());
        };

        ensure!(self.headers.len() < self.max_headers, ParseError::too_many_headers(self.max_headers));

        let value =
            HeaderValue::from_maybe_shared(value.freeze()).map_err(|e| ParseError::invalid_header(format!("value of {name}: {e}")))?;

        self.raw.extend_from_slice(&raw);
        self.raw.put_bytes(b' ', pad);
        self.raw.extend_from_slice(terminator.as_bytes());
        self.headers.append(name, value);
        Ok(())
    }

    fn finish(&mut self) -> Result<(RequestHead, BodyFraming), ParseError> {
        let RequestLine { method, target, version } =
            self.request_line.take().ok_or_else(|| ParseError::invalid_request_line("missing request line"))?;

        let head_size = self.consumed;
        let headers = std::mem::take(&mut self.headers);
        let raw = self.raw.split().freeze();
        self.state = HeadState::RequestLine;
        self.consumed = 0;

        let head = RequestHead::new(method, target, version, headers, raw);
        let framing = parse_framing(&head)?;

        trace!(head_size, header_count = head.headers().len(), ?framing, "parsed request head");
        Ok((head, framing))
    }
}

impl Decoder for HeadDecoder {
    type Item = (RequestHead, BodyFraming);
    type Error = ParseError;

    /// Consumes as much of the head as `src` holds.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((head, framing)))` once the blank line ending the head is consumed
    /// - `Ok(None)` if more data is needed
    /// - `Err(ParseError)` if the head is malformed or exceeds a limit
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        while let Some(terminator) = self.next_line(src)? {
            if let Some(item) = self.on_line(terminator)? {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    /// Like [`HeadDecoder::decode`], but a trailing `\r` ends its line since no
    /// `\n` can follow anymore. An unfinished head yields `Ok(None)`.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }

        if self.saw_cr && src.is_empty() {
            self.saw_cr = false;
            return self.on_line(Terminator::Cr);
        }
        Ok(None)
    }
}

impl PendingHeader {
    fn parse(line: BytesMut, terminator: Terminator) -> Result<Self, ParseError> {
        let colon = line
            .iter()
            .position(|b| *b == b':')
            .ok_or_else(|| ParseError::invalid_header(format!("missing ':' in {:?}", String::from_utf8_lossy(&line))))?;

        let name = line[..colon].trim_ascii_end();
        let name = HeaderName::from_bytes(name).map_err(|e| ParseError::invalid_header(format!("name {:?}: {e}", String::from_utf8_lossy(name))))?;
        let value = BytesMut::from(line[colon + 1..].trim_ascii());

        Ok(Self { name, value, raw: line, pad: 0, terminator })
    }

    fn fold(&mut self, line: &[u8], terminator: Terminator) {
        let content = trim_space_start(line);
        let indent = line.len() - content.len();

        let folded = content.trim_ascii_end();
        if !folded.is_empty() {
            if !self.value.is_empty() {
                self.value.put_u8(b' ');
            }
            self.value.extend_from_slice(folded);
        }

        self.raw.put_u8(b' ');
        self.raw.extend_from_slice(content);
        self.pad += self.terminator.as_bytes().len() - 1 + indent;
        self.terminator = terminator;
    }
}

#[inline]
fn is_space(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn trim_space_start(mut s: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = s {
        if !is_space(*first) {
            break;
        }
        s = rest;
    }
    s
}

fn parse_request_line(line: &[u8]) -> Result<RequestLine, ParseError> {
    let mut tokens = line.split(|b| is_space(*b)).filter(|token| !token.is_empty());

    let (Some(method), Some(target), Some(protocol), None) = (tokens.next(), tokens.next(), tokens.next(), tokens.next()) else {
        return Err(ParseError::invalid_request_line(String::from_utf8_lossy(line)));
    };

    let method = Method::from_bytes(method).map_err(|_| ParseError::InvalidMethod)?;

    // Currently HTTP/2 and HTTP/3 not supported
    let version = match protocol {
        b"HTTP/1.1" => Version::HTTP_11,
        b"HTTP/1.0" => Version::HTTP_10,
        other => return Err(ParseError::InvalidVersion(String::from_utf8_lossy(other).into_owned())),
    };

    let target = std::str::from_utf8(target).map_err(|_| ParseError::InvalidUri)?.to_owned();

    Ok(RequestLine { method, target, version })
}

/// Determines the receive framing of the request body.
///
/// refer: <https://www.rfc-editor.org/rfc/rfc9112.html#name-message-body-length>
///
/// - `Transfer-Encoding` with `chunked` as final coding: chunked
/// - `Content-Length`: exactly that many bytes
/// - neither: empty when the method carries no body or the connection is
///   persistent, otherwise the body lasts until the input closes
///
/// # Errors
///
/// Returns `ParseError` if:
/// - Both Content-Length and Transfer-Encoding headers are present
/// - Transfer-Encoding does not end with chunked
/// - Content-Length values are invalid or disagree
fn parse_framing(head: &RequestHead) -> Result<BodyFraming, ParseError> {
    let te_header = head.headers().get(TRANSFER_ENCODING);
    let cl_header = head.headers().get(CONTENT_LENGTH);

    match (te_header, cl_header) {
        (None, None) => {
            if !head.need_body() || head.is_persistent() {
                Ok(BodyFraming::Empty)
            } else {
                Ok(BodyFraming::UntilClose)
            }
        }

        (te_value @ Some(_), None) => {
            if is_chunked(te_value) {
                Ok(BodyFraming::Chunked)
            } else {
                Err(ParseError::invalid_header("transfer-encoding present but chunked is not the final coding"))
            }
        }

        (None, Some(_)) => {
            let mut length = None;
            for cl_value in head.headers().get_all(CONTENT_LENGTH) {
                let cl_str = cl_value.to_str().map_err(|_| ParseError::invalid_content_length("value can't to_str"))?;
                let value = cl_str
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| ParseError::invalid_content_length(format!("value {cl_str} is not u64")))?;

                ensure!(
                    length.is_none_or(|length| length == value),
                    ParseError::invalid_content_length("multiple content-length values disagree")
                );
                length = Some(value);
            }

            Ok(BodyFraming::new_length(length.unwrap_or_default()))
        }

        (Some(_), Some(_)) => Err(ParseError::invalid_content_length("transfer_encoding and content_length both present in headers")),
    }
}

/// Checks if the Transfer-Encoding header indicates chunked encoding.
///
/// According to RFC 7230, chunked must be the last encoding if present.
fn is_chunked(header_value: Option<&HeaderValue>) -> bool {
    const CHUNKED: &[u8] = b"chunked";
    if let Some(value) = header_value {
        if let Some(bytes) = value.as_bytes().rsplit(|b| *b == b',').next() {
            return bytes.trim_ascii().eq_ignore_ascii_case(CHUNKED);
        }
    }
    false
}
