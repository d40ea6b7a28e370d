//! The per-exchange state machine.
//!
//! An [`HttpChannel`] parses exactly one request and produces exactly one
//! response. It never touches the byte stream by itself: the owning
//! [`Connection`](super::Connection) lends it the stream input while it is the
//! connection's reader, and the stream output when it is its turn to write.
//!
//! Application code reacts to four events, each with an optional callback:
//!
//! - head ready: the request head is complete, fired once before any other event
//! - data received: body bytes were decoded, the body closed, or the input closed
//! - data flushed: response bytes were written or the response ended
//! - completed: both the request body and the response are done, fired once
//!
//! A callback runs synchronously inside the call that caused its event and
//! receives the channel itself; it may install any callback, itself included.

use std::fmt;

use bytes::{Bytes, BytesMut};
use http::header::{CONNECTION, CONTENT_LENGTH};
use http::{HeaderValue, Method, StatusCode, Version};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, trace, warn};

use crate::codec::{RequestDecoder, ResponseEncoder};
use crate::config::ChannelConfig;
use crate::protocol::body::{RecvBody, SendBody};
use crate::protocol::{BodyFraming, HttpError, Message, PayloadItem, RequestHead, ResponseHead, SendError};

/// A channel event callback.
pub type ChannelCallback = Box<dyn FnMut(&mut HttpChannel) -> Result<(), HttpError> + Send>;

type ResponseMessage<'a> = Message<(&'a ResponseHead, BodyFraming)>;

/// Identifies a channel within its connection, ids grow in request order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub(crate) u64);

impl ChannelId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Nothing of the request has been consumed
    Idle,
    ParsingRequestLine,
    ParsingHeaders,
    /// The request head is available, body and response may be in progress
    HeadReady,
    /// Request body and response are both finished
    Done,
    /// Handed back to the connection
    Released,
    /// The request head was malformed
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    HeadReady,
    DataReceived,
    DataFlushed,
    Completed,
}

pub struct HttpChannel {
    id: ChannelId,
    decoder: RequestDecoder,
    request: Option<RequestHead>,
    recv_framing: Option<BodyFraming>,
    recv_body: RecvBody,
    recv_failed: bool,
    response: ResponseHead,
    send_body: SendBody,
    encoder: ResponseEncoder,
    send_framing: Option<BodyFraming>,
    sending: bool,
    send_done: bool,
    send_failed: bool,
    input_closed: bool,
    output_closed: bool,
    failed: bool,
    discarding: bool,
    release_requested: bool,
    released: bool,
    completed: bool,
    on_head_ready: Option<ChannelCallback>,
    on_data_received: Option<ChannelCallback>,
    on_data_flushed: Option<ChannelCallback>,
    on_completed: Option<ChannelCallback>,
}

impl HttpChannel {
    pub(crate) fn new(id: ChannelId, config: &ChannelConfig) -> Self {
        Self {
            id,
            decoder: RequestDecoder::new(config),
            request: None,
            recv_framing: None,
            recv_body: RecvBody::new(),
            recv_failed: false,
            response: ResponseHead::default(),
            send_body: SendBody::new(),
            encoder: ResponseEncoder::new(),
            send_framing: None,
            sending: false,
            send_done: false,
            send_failed: false,
            input_closed: false,
            output_closed: false,
            failed: false,
            discarding: false,
            release_requested: false,
            released: false,
            completed: false,
            on_head_ready: None,
            on_data_received: None,
            on_data_flushed: None,
            on_completed: None,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn state(&self) -> ChannelState {
        if self.failed {
            ChannelState::Failed
        } else if self.request.is_none() {
            if self.decoder.is_parsing_headers() {
                ChannelState::ParsingHeaders
            } else if self.decoder.is_decoding_head() {
                ChannelState::ParsingRequestLine
            } else {
                ChannelState::Idle
            }
        } else if self.released {
            ChannelState::Released
        } else if self.completed {
            ChannelState::Done
        } else {
            ChannelState::HeadReady
        }
    }

    /// The request head, once it is complete.
    pub fn request(&self) -> Option<&RequestHead> {
        self.request.as_ref()
    }

    /// The request head as received, see [`RequestHead::raw`].
    pub fn raw_head(&self) -> Option<&Bytes> {
        self.request.as_ref().map(RequestHead::raw)
    }

    /// How the request body is delimited.
    pub fn recv_framing(&self) -> Option<BodyFraming> {
        self.recv_framing
    }

    pub fn recv_body(&self) -> &RecvBody {
        &self.recv_body
    }

    pub fn recv_body_mut(&mut self) -> &mut RecvBody {
        &mut self.recv_body
    }

    pub fn response(&self) -> &ResponseHead {
        &self.response
    }

    /// The response head, writable from head ready until the head is written.
    pub fn response_mut(&mut self) -> Result<&mut ResponseHead, HttpError> {
        self.ensure_head_ready("response head")?;
        if self.encoder.is_started() {
            return Err(HttpError::misuse(format!("channel {}: response head already written", self.id)));
        }
        Ok(&mut self.response)
    }

    pub fn send_body(&self) -> &SendBody {
        &self.send_body
    }

    pub fn send_body_mut(&mut self) -> Result<&mut SendBody, HttpError> {
        self.ensure_head_ready("response body")?;
        Ok(&mut self.send_body)
    }

    /// Asks the connection to write the response.
    ///
    /// The head is written as soon as every earlier response on the connection
    /// is complete, followed by the queued body and then by whatever is
    /// appended later.
    pub fn start_sending(&mut self) -> Result<(), HttpError> {
        self.ensure_head_ready("start sending")?;
        if !self.sending {
            trace!(channel = %self.id, "start sending");
            self.sending = true;
        }
        Ok(())
    }

    /// Whether the request body is still being received.
    pub fn is_receiving_body(&self) -> bool {
        self.request.is_some() && !self.recv_body.is_closed()
    }

    /// Whether the response was requested to be sent and is not finished yet.
    pub fn is_sending(&self) -> bool {
        self.sending && !self.send_done
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Whether the connection may carry another request after this exchange.
    ///
    /// False when any of these holds:
    /// - HTTP/1.0 request without `Connection: keep-alive`
    /// - `Connection: close` on the request or on the response
    /// - the input was closed, or the transport closed the output
    /// - the request body failed, or was delimited by the close of the input
    /// - the response body is delimited by the close of the output
    /// - the response could not be encoded, e.g. its body broke its `Content-Length`
    pub fn keep_alive(&self) -> bool {
        if self.failed || self.input_closed || self.output_closed || self.recv_failed || self.send_failed {
            return false;
        }

        let Some(request) = &self.request else {
            return true;
        };

        request.is_persistent()
            && !self.recv_framing.is_some_and(|framing| framing.is_until_close())
            && !self.response.headers().has_token(CONNECTION, "close")
            && !self.send_framing.is_some_and(|framing| framing.is_until_close())
    }

    /// Releases this channel once the running callback returns.
    ///
    /// Same checks and effects as [`Connection::release`](super::Connection::release),
    /// for code that only holds the channel.
    pub fn release(&mut self) -> Result<(), HttpError> {
        self.check_release()?;
        self.release_requested = true;
        Ok(())
    }

    pub fn set_head_ready_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut HttpChannel) -> Result<(), HttpError> + Send + 'static,
    {
        self.on_head_ready = Some(Box::new(callback));
    }

    pub fn set_data_received_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut HttpChannel) -> Result<(), HttpError> + Send + 'static,
    {
        self.on_data_received = Some(Box::new(callback));
    }

    pub fn set_data_flushed_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut HttpChannel) -> Result<(), HttpError> + Send + 'static,
    {
        self.on_data_flushed = Some(Box::new(callback));
    }

    pub fn set_completed_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&mut HttpChannel) -> Result<(), HttpError> + Send + 'static,
    {
        self.on_completed = Some(Box::new(callback));
    }

    fn ensure_head_ready(&self, operation: &str) -> Result<(), HttpError> {
        if self.request.is_none() {
            return Err(HttpError::misuse(format!("channel {}: {operation} before the request head is ready", self.id)));
        }
        Ok(())
    }

    pub(crate) fn check_release(&self) -> Result<(), HttpError> {
        self.ensure_head_ready("release")?;
        if self.released || self.release_requested {
            return Err(HttpError::misuse(format!("channel {} already released", self.id)));
        }
        if !self.send_body.is_closed() {
            return Err(HttpError::misuse(format!("channel {}: release before the response body is closed", self.id)));
        }
        Ok(())
    }

    pub(crate) fn is_release_requested(&self) -> bool {
        self.release_requested
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.failed
    }

    pub(crate) fn is_send_done(&self) -> bool {
        self.send_done
    }

    /// Nothing left to do for the connection: released or failed, and finished.
    pub(crate) fn is_finished(&self) -> bool {
        self.send_done && (self.failed || (self.released && self.recv_body.is_closed()))
    }

    /// Hands the channel back: the response is sent as soon as possible and
    /// the rest of an unread request body is discarded.
    pub(crate) fn mark_released(&mut self) {
        self.released = true;
        self.release_requested = false;
        self.sending = true;

        if !self.recv_body.is_closed() {
            debug!(channel = %self.id, "released before the request body ended, discard the rest");
            self.discarding = true;
            self.recv_body.read_all();
        }
    }

    /// Turns a channel with a malformed head into a `400 Bad Request` response.
    pub(crate) fn answer_bad_request(&mut self) {
        let mut response = ResponseHead::new(Version::HTTP_11);
        response.set_status(StatusCode::BAD_REQUEST);
        response.headers_mut().insert(CONNECTION, HeaderValue::from_static("close"));

        self.response = response;
        self.send_body.close();
        self.sending = true;
    }

    /// Consumes request bytes from `input`.
    ///
    /// Stops at the end of the request body, leaving pipelined bytes in `input`.
    /// Returns whether anything happened. A malformed head fails the channel
    /// and is returned as error; a broken body is recorded on the receive body.
    pub(crate) fn read(&mut self, input: &mut BytesMut, input_closed: bool) -> Result<bool, HttpError> {
        if self.failed {
            return Ok(false);
        }

        let mut progress = false;
        let mut data_event = false;

        if input_closed && !self.input_closed {
            self.input_closed = true;
            progress = true;
            data_event = self.request.is_some();
        }

        while !self.recv_body.is_closed() {
            let decoded = if input_closed { self.decoder.decode_eof(input) } else { self.decoder.decode(input) };

            let message = match decoded {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(e) if self.request.is_none() => {
                    self.failed = true;
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(channel = %self.id, cause = %e, "request body ended abnormally");
                    self.recv_failed = true;
                    self.recv_body.fail(e);
                    progress = true;
                    data_event = true;
                    break;
                }
            };

            progress = true;
            match message {
                Message::Header((head, framing)) => self.on_head(head, framing)?,
                Message::Payload(PayloadItem::Chunk(bytes)) => {
                    if !self.discarding {
                        self.recv_body.push(&bytes);
                        data_event = true;
                    }
                }
                Message::Payload(PayloadItem::Eof) => {
                    trace!(channel = %self.id, received = self.recv_body.received_len(), "request body finished");
                    self.recv_body.close();
                    data_event = true;
                }
            }
        }

        if data_event && !self.discarding {
            self.fire(Event::DataReceived)?;
        }
        self.maybe_complete()?;
        Ok(progress)
    }

    fn on_head(&mut self, head: RequestHead, framing: BodyFraming) -> Result<(), HttpError> {
        debug!(channel = %self.id, method = %head.method(), target = head.target(), ?framing, "request head ready");

        self.response.set_version(head.version());
        if head.method() == Method::HEAD {
            self.encoder = ResponseEncoder::without_body();
        }
        self.recv_framing = Some(framing);
        self.request = Some(head);

        self.fire(Event::HeadReady)
    }

    /// Writes whatever the response has ready to `output`.
    ///
    /// Only called for the oldest unfinished response of the connection.
    /// Returns whether anything happened.
    pub(crate) fn flush(&mut self, output: &mut BytesMut, output_closed: bool) -> Result<bool, HttpError> {
        if output_closed {
            self.output_closed = true;
        }
        if !self.sending || self.send_done {
            return Ok(false);
        }

        if output_closed {
            debug!(channel = %self.id, "output closed before the response was written");
            self.send_done = true;
            while self.send_body.pop().is_some() {}
            self.maybe_complete()?;
            return Ok(true);
        }

        let wrote = match self.write_response(output) {
            Ok(wrote) => wrote,
            Err(e) => {
                warn!(channel = %self.id, cause = %e, "response can't be encoded, abort it");
                self.send_failed = true;
                self.send_done = true;
                while self.send_body.pop().is_some() {}
                self.maybe_complete()?;
                return Err(e.into());
            }
        };

        if wrote || self.send_done {
            self.fire(Event::DataFlushed)?;
        }
        self.maybe_complete()?;
        Ok(wrote || self.send_done)
    }

    fn write_response(&mut self, output: &mut BytesMut) -> Result<bool, SendError> {
        let mut wrote = false;
        if !self.encoder.is_started() {
            let framing = self.select_send_framing()?;
            self.send_framing = Some(framing);
            self.add_connection_header();

            debug!(channel = %self.id, status = %self.response.status(), ?framing, "write response head");
            self.encoder.encode(ResponseMessage::Header((&self.response, framing)), output)?;
            wrote = true;
        }

        while let Some(chunk) = self.send_body.pop() {
            self.encoder.encode(ResponseMessage::Payload(PayloadItem::Chunk(chunk)), output)?;
            wrote = true;
        }

        if self.send_body.is_closed() {
            self.encoder.encode(ResponseMessage::Payload(PayloadItem::Eof), output)?;
            self.send_done = true;
            trace!(channel = %self.id, total = self.send_body.total_len(), "response finished");
        }
        Ok(wrote)
    }

    /// Picks the response framing when the head is written:
    /// - an application `Content-Length` wins
    /// - a closed body announces its total length
    /// - an open body is chunked on HTTP/1.1, and ends with the connection on HTTP/1.0
    fn select_send_framing(&self) -> Result<BodyFraming, SendError> {
        let status = self.response.status();
        if status.is_informational() || status == StatusCode::NO_CONTENT || status == StatusCode::NOT_MODIFIED {
            return Ok(BodyFraming::Empty);
        }

        if let Some(value) = self.response.headers().get(CONTENT_LENGTH) {
            let length = value
                .to_str()
                .ok()
                .and_then(|value| value.trim().parse::<u64>().ok())
                .ok_or_else(|| SendError::invalid_body(format!("invalid response content-length {value:?}")))?;
            return Ok(BodyFraming::Length(length));
        }

        if self.send_body.is_closed() {
            return Ok(BodyFraming::new_length(self.send_body.total_len()));
        }

        match self.response.version() {
            Version::HTTP_10 => Ok(BodyFraming::UntilClose),
            _ => Ok(BodyFraming::Chunked),
        }
    }

    fn add_connection_header(&mut self) {
        let keep_alive = self.keep_alive();
        let version = self.response.version();
        let headers = self.response.headers_mut();

        match version {
            Version::HTTP_10 if keep_alive && !headers.has_token(CONNECTION, "keep-alive") => {
                headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
            }
            Version::HTTP_11 if !keep_alive && !headers.has_token(CONNECTION, "close") => {
                headers.insert(CONNECTION, HeaderValue::from_static("close"));
            }
            _ => {}
        }
    }

    fn maybe_complete(&mut self) -> Result<(), HttpError> {
        if self.completed || !self.send_done || self.request.is_none() || !self.recv_body.is_closed() {
            return Ok(());
        }

        self.completed = true;
        debug!(channel = %self.id, keep_alive = self.keep_alive(), "exchange completed");
        self.fire(Event::Completed)
    }

    fn callback_slot(&mut self, event: Event) -> &mut Option<ChannelCallback> {
        match event {
            Event::HeadReady => &mut self.on_head_ready,
            Event::DataReceived => &mut self.on_data_received,
            Event::DataFlushed => &mut self.on_data_flushed,
            Event::Completed => &mut self.on_completed,
        }
    }

    /// Runs the callback of `event` with the channel itself as argument.
    ///
    /// The callback is out of its slot while it runs; it is put back unless it
    /// installed a replacement.
    fn fire(&mut self, event: Event) -> Result<(), HttpError> {
        let Some(mut callback) = self.callback_slot(event).take() else {
            return Ok(());
        };

        trace!(channel = %self.id, ?event, "dispatch callback");
        let result = callback(self);

        let slot = self.callback_slot(event);
        if slot.is_none() {
            *slot = Some(callback);
        }
        result
    }
}

impl fmt::Debug for HttpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpChannel")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("request", &self.request)
            .field("response", &self.response)
            .field("recv_body", &self.recv_body)
            .field("send_body", &self.send_body)
            .field("sending", &self.sending)
            .field("send_done", &self.send_done)
            .finish_non_exhaustive()
    }
}
