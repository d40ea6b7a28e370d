//! Channels sharing one byte stream.
//!
//! A [`Connection`] owns the [`ByteStream`] of one transport connection and
//! the channels that serve the requests arriving on it:
//!
//! - exactly one channel, the *reader*, consumes input at a time
//! - responses are written in request order, a later response waits until
//!   every earlier one is complete
//! - a released channel hands the input over to a successor built by the
//!   [`ChannelFactory`] when the exchange keeps the connection alive
//! - once the connection stops being persistent and the last response is
//!   written, the stream output is closed
//!
//! Every operation drives the channels synchronously until nothing more can
//! happen with the bytes at hand; callbacks run inside that call.

use std::collections::VecDeque;

use bytes::Bytes;
use tracing::{debug, error, trace};

use crate::channel::factory::ChannelFactory;
use crate::channel::http_channel::{ChannelId, HttpChannel};
use crate::config::ChannelConfig;
use crate::handler::{Handler, HandlerFactory};
use crate::protocol::HttpError;
use crate::stream::ByteStream;

pub struct Connection {
    config: ChannelConfig,
    stream: ByteStream,
    factory: Box<dyn ChannelFactory>,
    channels: VecDeque<HttpChannel>,
    reader: Option<ChannelId>,
    next_id: u64,
    awaiting_successor: bool,
    persistent: bool,
    failure: Option<HttpError>,
}

impl Connection {
    /// Creates a connection whose channels are set up by `factory`.
    ///
    /// The first channel is created right away, so callbacks can be installed
    /// on it before any input arrives.
    pub fn new<F: ChannelFactory + 'static>(factory: F) -> Self {
        Self::with_config(ChannelConfig::default(), factory)
    }

    pub fn with_config<F: ChannelFactory + 'static>(config: ChannelConfig, factory: F) -> Self {
        let mut connection = Self {
            config,
            stream: ByteStream::with_capacity(config.read_capacity()),
            factory: Box::new(factory),
            channels: VecDeque::new(),
            reader: None,
            next_id: 0,
            awaiting_successor: false,
            persistent: true,
            failure: None,
        };
        connection.spawn_reader();
        connection
    }

    /// Creates a connection answering every request with `handler`.
    pub fn with_handler<H: Handler + 'static>(handler: H) -> Self {
        Self::new(HandlerFactory::new(handler))
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn stream(&self) -> &ByteStream {
        &self.stream
    }

    /// The channel consuming input.
    ///
    /// `None` while a kept alive connection waits for its next request, and
    /// once the connection stopped reading.
    pub fn current(&self) -> Option<ChannelId> {
        self.reader
    }

    /// Channels still owned by the connection, oldest first.
    pub fn channel_ids(&self) -> impl Iterator<Item = ChannelId> + '_ {
        self.channels.iter().map(HttpChannel::id)
    }

    /// A channel that has been released and has finished is dropped from the
    /// connection, and no longer found here.
    pub fn channel(&self, id: ChannelId) -> Option<&HttpChannel> {
        self.channels.iter().find(|channel| channel.id() == id)
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut HttpChannel> {
        self.channels.iter_mut().find(|channel| channel.id() == id)
    }

    /// Whether another request may follow on this connection.
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Appends bytes read from the peer and processes them.
    ///
    /// # Errors
    ///
    /// - `HttpError::RequestError` when a request head is malformed; a
    ///   `400 Bad Request` is written and the connection stops being persistent
    /// - `HttpError::Misuse` when the input was closed before
    /// - any error returned by a callback
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), HttpError> {
        if self.stream.append_input(bytes).is_err() {
            return Err(HttpError::misuse("feed after the input was closed"));
        }
        trace!(len = bytes.len(), "feed input");
        self.drive()
    }

    /// The peer will not send anything more.
    pub fn close_input(&mut self) -> Result<(), HttpError> {
        debug!("input closed");
        self.stream.close_input();
        self.drive()
    }

    /// The transport can no longer write; pending responses are dropped.
    pub fn close_output(&mut self) -> Result<(), HttpError> {
        debug!("output closed by transport");
        self.stream.close_output();
        self.drive()
    }

    /// [`HttpChannel::start_sending`] on the channel `id`, then writes what it can.
    pub fn start_sending(&mut self, id: ChannelId) -> Result<(), HttpError> {
        self.known_channel(id)?.start_sending()?;
        self.drive()
    }

    /// Hands the channel `id` back to the connection.
    ///
    /// Requires the request head to be ready and the response body to be
    /// closed; the response is sent if the application has not started it
    /// yet. An unread request body is discarded. When the exchange keeps the
    /// connection alive and pipelined bytes are buffered, the successor is
    /// created, parses them right away and its id is returned. Without buffered
    /// bytes the successor is created when input arrives.
    pub fn release(&mut self, id: ChannelId) -> Result<Option<ChannelId>, HttpError> {
        let channel = self.known_channel(id)?;
        channel.check_release()?;
        channel.mark_released();
        debug!(channel = %id, "channel released");

        let first_successor = self.next_id;
        self.drive()?;
        Ok((self.next_id > first_successor).then_some(ChannelId(first_successor)))
    }

    /// Takes every response byte written so far, for the transport to send.
    pub fn take_output(&mut self) -> Bytes {
        self.stream.take_output()
    }

    /// Processes buffered input and pending responses until nothing changes.
    pub fn drive(&mut self) -> Result<(), HttpError> {
        loop {
            let mut progress = self.read_input()?;
            progress |= self.flush_output()?;
            progress |= self.release_requested();
            progress |= self.hand_off_input();
            progress |= self.finish_last_exchange();
            self.evict_finished();

            if !progress {
                break;
            }
        }

        self.close_output_when_done();
        match self.failure.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn known_channel(&mut self, id: ChannelId) -> Result<&mut HttpChannel, HttpError> {
        self.channel_mut(id).ok_or_else(|| HttpError::misuse(format!("unknown or finished channel {id}")))
    }

    fn spawn_reader(&mut self) -> ChannelId {
        let id = ChannelId(self.next_id);
        self.next_id += 1;

        let mut channel = HttpChannel::new(id, &self.config);
        self.factory.init_channel(&mut channel);
        self.channels.push_back(channel);
        self.reader = Some(id);

        debug!(channel = %id, "new channel");
        id
    }

    fn read_input(&mut self) -> Result<bool, HttpError> {
        if self.awaiting_successor && !self.stream.buffered_input().is_empty() {
            self.awaiting_successor = false;
            self.spawn_reader();
        }

        let Some(id) = self.reader else {
            return Ok(false);
        };
        let Some(channel) = self.channels.iter_mut().find(|channel| channel.id() == id) else {
            self.reader = None;
            return Ok(false);
        };

        let input_closed = self.stream.is_input_closed();
        match channel.read(self.stream.input_mut(), input_closed) {
            Ok(progress) => Ok(progress),
            Err(e) if channel.is_failed() => {
                error!(channel = %id, cause = %e, "malformed request head, answer 400 and stop reading");
                channel.answer_bad_request();
                self.reader = None;
                self.persistent = false;
                self.stream.input_mut().clear();
                self.failure = Some(e);
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Flushes responses in request order, stopping at the first one that is
    /// not complete. With the output closed every pending response is dropped.
    fn flush_output(&mut self) -> Result<bool, HttpError> {
        let output_closed = self.stream.is_output_closed();
        let mut progress = false;

        for channel in &mut self.channels {
            if channel.is_send_done() {
                continue;
            }

            match channel.flush(self.stream.output_mut(), output_closed) {
                Ok(flushed) => progress |= flushed,
                Err(e) => {
                    error!(channel = %channel.id(), cause = %e, "response aborted, close output");
                    self.persistent = false;
                    self.stream.close_output();
                    return Err(e);
                }
            }

            if !channel.is_send_done() {
                if output_closed {
                    continue;
                }
                break;
            }
        }
        Ok(progress)
    }

    /// Stops the connection once the last exchange is over and does not keep
    /// it alive: its response is written and its request body has ended.
    fn finish_last_exchange(&mut self) -> bool {
        if self.stream.is_output_closed() {
            return false;
        }
        let Some(last) = self.channels.back() else {
            return false;
        };

        if !last.is_send_done() || last.is_receiving_body() || last.keep_alive() {
            return false;
        }
        if self.reader.is_some_and(|id| id != last.id()) {
            return false;
        }

        debug!(channel = %last.id(), "last exchange on a non persistent connection, close output");
        self.persistent = false;
        self.reader = None;
        self.stream.close_output();
        true
    }

    fn release_requested(&mut self) -> bool {
        let mut progress = false;
        for channel in self.channels.iter_mut().filter(|channel| channel.is_release_requested()) {
            debug!(channel = %channel.id(), "channel released");
            channel.mark_released();
            progress = true;
        }
        progress
    }

    /// Moves the input to a successor once the reader is released and its
    /// request body has ended.
    fn hand_off_input(&mut self) -> bool {
        let input_closed = self.stream.is_input_closed();

        if self.awaiting_successor && input_closed && self.stream.buffered_input().is_empty() {
            debug!("input closed while waiting for the next request");
            self.awaiting_successor = false;
            self.persistent = false;
            return true;
        }

        let Some(id) = self.reader else {
            return false;
        };
        let Some(channel) = self.channel(id) else {
            self.reader = None;
            return true;
        };

        if channel.request().is_none() {
            if !input_closed || channel.is_failed() {
                return false;
            }
            debug!(channel = %id, "input closed before a request head, stop reading");
            self.channels.retain(|channel| channel.id() != id);
            self.reader = None;
            self.persistent = false;
            return true;
        }

        if !channel.is_released() || channel.is_receiving_body() {
            return false;
        }

        let keep_alive = channel.keep_alive();
        self.reader = None;
        if !keep_alive {
            debug!(channel = %id, "exchange does not keep the connection alive, stop reading");
            self.persistent = false;
        } else if !self.stream.buffered_input().is_empty() {
            let successor = self.spawn_reader();
            debug!(channel = %id, %successor, "pipelined request buffered, hand off input");
        } else {
            trace!(channel = %id, "wait for the next request");
            self.awaiting_successor = true;
        }
        true
    }

    fn evict_finished(&mut self) {
        self.channels.retain(|channel| {
            let finished = channel.is_finished();
            if finished {
                trace!(channel = %channel.id(), "evict finished channel");
            }
            !finished
        });
    }

    fn close_output_when_done(&mut self) {
        if self.persistent || self.stream.is_output_closed() || self.awaiting_successor {
            return;
        }

        if self.channels.iter().all(HttpChannel::is_send_done) {
            debug!("connection not persistent and all responses written, close output");
            self.stream.close_output();
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.config)
            .field("stream", &self.stream)
            .field("channels", &self.channels)
            .field("reader", &self.reader)
            .field("persistent", &self.persistent)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelState;
    use http::header::CONTENT_LENGTH;
    use http::{HeaderValue, Method, StatusCode};
    use std::io::Read;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::task::Poll;

    const TWO_REQUESTS: &str = "GET /index.html?q=b&c=d HTTP/1.1\r\n\
                                Host:  Foo.com \n\
                                H2:Bar\r\n\
                                H3: Foo \r\n Bar\r\n\
                                H4: Foo\n    Bar\n\
                                \r\n\
                                HEAD /r2? HTTP/1.1\n\
                                Host: Foo.com\r\n\
                                H3: Foo \r\n       Bar\r\n\
                                H4: Foo\n Bar\n\
                                \r\n";

    const POST: &str = "POST / HTTP/1.0\nConnection: Close\nContent-Length: 4\n\n1234";

    fn noop(_: &mut HttpChannel) {}

    fn connection() -> Connection {
        Connection::new(noop)
    }

    fn respond(connection: &mut Connection, id: ChannelId, body: &'static str) {
        let channel = connection.channel_mut(id).unwrap();
        let send_body = channel.send_body_mut().unwrap();
        send_body.append(body).unwrap();
        send_body.close();
    }

    fn output(connection: &Connection) -> &str {
        std::str::from_utf8(connection.stream().pending_output()).unwrap()
    }

    fn flag() -> (Arc<AtomicBool>, Arc<AtomicBool>) {
        let flag = Arc::new(AtomicBool::new(false));
        (flag.clone(), flag)
    }

    #[test]
    fn two_pipelined_requests() {
        let mut connection = connection();
        let first = connection.current().unwrap();
        connection.feed(TWO_REQUESTS.as_bytes()).unwrap();

        let request = connection.channel(first).unwrap().request().unwrap();
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.protocol(), "HTTP/1.1");
        assert_eq!(request.headers().size(), 4);
        assert_eq!(request.header("Host"), Some("Foo.com"));
        assert_eq!(request.header("H2"), Some("Bar"));
        assert_eq!(request.header("H4"), Some("Foo Bar"));

        respond(&mut connection, first, "Response1");
        connection.start_sending(first).unwrap();
        let second = connection.release(first).unwrap().expect("pipelined request is parsed on release");

        assert_eq!(connection.current(), Some(second));
        let request = connection.channel(second).unwrap().request().unwrap();
        assert_eq!(request.method(), &Method::HEAD);
        assert_eq!(request.protocol(), "HTTP/1.1");
        assert_eq!(request.target(), "/r2?");
        assert_eq!(request.headers().size(), 3);
        assert_eq!(request.header("Host"), Some("Foo.com"));
        assert_eq!(request.header("H3"), Some("Foo Bar"));

        assert_eq!(output(&connection), "HTTP/1.1 200 OK\r\ncontent-length: 9\r\n\r\nResponse1");
        assert!(connection.channel(first).is_none());
    }

    #[test]
    fn two_pipelined_requests_byte_by_byte() {
        let input = "GET /index.html?q=b&c=d HTTP/1.1\r\n\
                     Host:  Foo.com \n\
                     H2:Bar\r\n\
                     H3: Foo \r\n Bar\r\n\
                     H4: Foo\n    Bar\n\
                     \r\n\
                     HEAD /r2? HTTP/1.1\n\
                     Host: Foo1.com\n\
                     H3: Foo \r\n       Bar\r\n\
                     \r\n";

        let mut connection = connection();
        let first = connection.current().unwrap();
        for byte in input.as_bytes() {
            connection.feed(std::slice::from_ref(byte)).unwrap();
        }

        let request = connection.channel(first).unwrap().request().unwrap();
        assert_eq!(request.method(), &Method::GET);
        assert_eq!(request.headers().size(), 4);
        assert_eq!(request.header("Host"), Some("Foo.com"));

        respond(&mut connection, first, "Response1");
        connection.start_sending(first).unwrap();
        let second = connection.release(first).unwrap().unwrap();

        let request = connection.channel(second).unwrap().request().unwrap();
        assert_eq!(request.method(), &Method::HEAD);
        assert_eq!(request.headers().size(), 2);
        assert_eq!(request.header("Host"), Some("Foo1.com"));

        respond(&mut connection, second, "Response2");
        assert_eq!(connection.release(second).unwrap(), None);

        assert_eq!(
            output(&connection),
            "HTTP/1.1 200 OK\r\ncontent-length: 9\r\n\r\nResponse1HTTP/1.1 200 OK\r\ncontent-length: 9\r\n\r\n"
        );
        assert_eq!(connection.current(), None);
        assert!(connection.is_persistent());
    }

    #[test]
    fn output_does_not_depend_on_input_granularity() {
        fn run(chunk_size: usize) -> Bytes {
            let mut connection = Connection::new(|channel: &mut HttpChannel| {
                channel.set_head_ready_callback(|channel| {
                    let target = channel.request().map(|request| request.target().to_owned()).unwrap_or_default();
                    let send_body = channel.send_body_mut()?;
                    send_body.append(target)?;
                    send_body.close();
                    channel.release()
                });
            });

            for chunk in TWO_REQUESTS.as_bytes().chunks(chunk_size) {
                connection.feed(chunk).unwrap();
            }
            connection.take_output()
        }

        let bulk = run(TWO_REQUESTS.len());
        assert_eq!(bulk, run(1));
        assert_eq!(bulk, run(7));
        assert_eq!(
            &bulk[..],
            b"HTTP/1.1 200 OK\r\ncontent-length: 19\r\n\r\n/index.html?q=b&c=dHTTP/1.1 200 OK\r\ncontent-length: 4\r\n\r\n"
        );
    }

    #[test]
    fn multi_line_head() {
        let mut connection = connection();
        let id = connection.current().unwrap();
        connection.feed(b"GET / HTTP/1.0\nCookie: 1234\n  456 \nConnection:   Close\n\n").unwrap();
        connection.close_input().unwrap();

        let channel = connection.channel(id).unwrap();
        let request = channel.request().unwrap();
        assert_eq!(request.header("Connection"), Some("Close"));
        assert_eq!(request.header("Cookie"), Some("1234 456"));
        assert_eq!(&channel.raw_head().unwrap()[..], b"GET / HTTP/1.0\nCookie: 1234 456   \nConnection:   Close\n\n");
    }

    #[test]
    fn close_socket() {
        let mut connection = connection();
        let id = connection.current().unwrap();
        connection.feed(b"GET / HTTP/1.1\nHost: localhost\n\n").unwrap();
        assert!(connection.channel(id).unwrap().keep_alive());

        connection.close_input().unwrap();
        assert!(!connection.channel(id).unwrap().keep_alive());
    }

    #[test]
    fn end_without_flush_callbacks() {
        let mut connection = connection();
        let id = connection.current().unwrap();
        let (all_done, done) = flag();
        connection.channel_mut(id).unwrap().set_completed_callback(move |_| {
            done.store(true, Ordering::SeqCst);
            Ok(())
        });

        connection.feed(POST.as_bytes()).unwrap();
        connection.close_input().unwrap();

        respond(&mut connection, id, "Hi");
        connection.start_sending(id).unwrap();

        assert!(all_done.load(Ordering::SeqCst));
    }

    #[test]
    fn callbacks() {
        let mut connection = connection();
        let id = connection.current().unwrap();
        let (headers_done, headers) = flag();
        let (body_done, body) = flag();
        let (body_sent_done, body_sent) = flag();
        let (all_done, done) = flag();
        let received = Arc::new(AtomicUsize::new(0));
        let received_calls = Arc::clone(&received);

        let channel = connection.channel_mut(id).unwrap();
        channel.set_completed_callback(move |_| {
            done.store(true, Ordering::SeqCst);
            Ok(())
        });
        channel.set_head_ready_callback(move |_| {
            headers.store(true, Ordering::SeqCst);
            Ok(())
        });
        channel.set_data_received_callback(move |channel| {
            received_calls.fetch_add(1, Ordering::SeqCst);
            if channel.recv_body().is_closed() {
                body.store(true, Ordering::SeqCst);
            }
            Ok(())
        });
        channel.set_data_flushed_callback(move |channel| {
            if channel.send_body().is_closed() {
                body_sent.store(true, Ordering::SeqCst);
            }
            Ok(())
        });

        connection.feed(POST.as_bytes()).unwrap();
        assert!(headers_done.load(Ordering::SeqCst));
        assert!(body_done.load(Ordering::SeqCst));
        let before_close = received.load(Ordering::SeqCst);

        // no bytes after the declared length, closing the input is still reported
        connection.close_input().unwrap();
        assert_eq!(received.load(Ordering::SeqCst), before_close + 1);
        assert_eq!(connection.channel(id).unwrap().recv_body().received_len(), 4);

        respond(&mut connection, id, "Hi");
        connection.start_sending(id).unwrap();
        assert!(body_sent_done.load(Ordering::SeqCst));
        assert!(all_done.load(Ordering::SeqCst));
    }

    #[test]
    fn close() {
        let mut connection = connection();
        let id = connection.current().unwrap();
        connection.feed(POST.as_bytes()).unwrap();
        connection.close_input().unwrap();

        let channel = connection.channel_mut(id).unwrap();
        let mut body = String::new();
        channel.recv_body_mut().read_to_string(&mut body).unwrap();
        assert_eq!(body, "1234");
        assert!(!channel.keep_alive());
        assert!(!channel.keep_alive());

        let send_body = channel.send_body_mut().unwrap();
        send_body.append(body).unwrap();
        send_body.close();
        connection.start_sending(id).unwrap();

        assert!(connection.stream().is_output_closed());
        assert!(output(&connection).find("\n1234").is_some_and(|index| index > 0));
        assert_eq!(connection.current(), None);
    }

    #[test]
    fn read_line() {
        let mut connection = connection();
        let id = connection.current().unwrap();
        connection
            .feed(b"POST / HTTP/1.0\nContent-Length: 28\n\nLine 1\nLine 2\r\nLine 3\rLine 4")
            .unwrap();
        connection.close_input().unwrap();

        let body = connection.channel_mut(id).unwrap().recv_body_mut();
        for expected in ["Line 1", "Line 2", "Line 3", "Line 4"] {
            match body.poll_line() {
                Poll::Ready(Ok(Some(line))) => assert_eq!(line, expected),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(matches!(body.poll_line(), Poll::Ready(Ok(None))));
    }

    #[test]
    fn streamed_response_is_written_before_the_next_one() {
        let mut connection = connection();
        let first = connection.current().unwrap();
        connection.feed(b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n").unwrap();

        connection.channel_mut(first).unwrap().send_body_mut().unwrap().append("ab").unwrap();
        connection.start_sending(first).unwrap();
        assert_eq!(&connection.take_output()[..], b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n2\r\nab\r\n");

        connection.channel_mut(first).unwrap().send_body_mut().unwrap().append("cde").unwrap();
        connection.drive().unwrap();
        assert_eq!(&connection.take_output()[..], b"3\r\ncde\r\n");
        assert!(connection.channel(first).unwrap().is_sending());

        connection.channel_mut(first).unwrap().send_body_mut().unwrap().close();
        let second = connection.release(first).unwrap().unwrap();
        assert_eq!(connection.channel(second).unwrap().request().unwrap().target(), "/b");

        respond(&mut connection, second, "b");
        connection.release(second).unwrap();
        assert_eq!(&connection.take_output()[..], b"0\r\n\r\nHTTP/1.1 200 OK\r\ncontent-length: 1\r\n\r\nb");
    }

    #[test]
    fn successor_created_when_input_arrives() {
        let mut connection = connection();
        let first = connection.current().unwrap();
        connection.feed(b"GET /a HTTP/1.1\r\n\r\n").unwrap();

        respond(&mut connection, first, "a");
        assert_eq!(connection.release(first).unwrap(), None);
        assert_eq!(connection.current(), None);
        assert_eq!(connection.channel_ids().count(), 0);
        assert!(connection.is_persistent());

        connection.feed(b"GET /b HTTP/1.1\r\n").unwrap();
        let second = connection.current().unwrap();
        assert_ne!(first, second);
        assert_eq!(connection.channel(second).unwrap().state(), ChannelState::ParsingHeaders);

        connection.feed(b"\r\n").unwrap();
        let channel = connection.channel(second).unwrap();
        assert_eq!(channel.state(), ChannelState::HeadReady);
        assert_eq!(channel.request().unwrap().target(), "/b");
    }

    #[test]
    fn input_closed_while_waiting_for_next_request() {
        let mut connection = connection();
        let first = connection.current().unwrap();
        connection.feed(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        respond(&mut connection, first, "");
        connection.release(first).unwrap();
        assert!(!connection.stream().is_output_closed());

        connection.close_input().unwrap();
        assert!(!connection.is_persistent());
        assert!(connection.stream().is_output_closed());
        assert_eq!(output(&connection), "HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n");
    }

    #[test]
    fn unread_body_is_discarded_after_release() {
        let mut connection = connection();
        let first = connection.current().unwrap();
        connection.feed(b"POST /upload HTTP/1.1\r\nContent-Length: 10\r\n\r\n12345").unwrap();

        respond(&mut connection, first, "early");
        assert_eq!(connection.release(first).unwrap(), None);
        assert_eq!(connection.current(), Some(first));
        assert_eq!(connection.channel(first).unwrap().recv_body().available(), 0);

        connection.feed(b"67890GET /next HTTP/1.1\r\n\r\n").unwrap();
        let second = connection.current().unwrap();
        assert_ne!(first, second);
        assert!(connection.channel(first).is_none());
        assert_eq!(connection.channel(second).unwrap().request().unwrap().target(), "/next");
    }

    #[test]
    fn chunked_request_body() {
        let mut connection = connection();
        let id = connection.current().unwrap();
        connection
            .feed(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n")
            .unwrap();
        assert!(connection.channel(id).unwrap().is_receiving_body());

        connection.feed(b"0\r\n\r\n").unwrap();
        let channel = connection.channel_mut(id).unwrap();
        assert!(!channel.is_receiving_body());
        assert_eq!(channel.recv_body().received_len(), 9);
        assert_eq!(&channel.recv_body_mut().read_all()[..], b"Wikipedia");
        assert!(channel.keep_alive());
    }

    #[test]
    fn truncated_body_fails_the_body_only() {
        let mut connection = connection();
        let id = connection.current().unwrap();
        connection.feed(b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\n123").unwrap();
        connection.close_input().unwrap();

        let channel = connection.channel_mut(id).unwrap();
        assert!(channel.recv_body().is_truncated());
        assert!(!channel.keep_alive());

        let response = channel.response_mut().unwrap();
        response.set_status(StatusCode::BAD_REQUEST);
        respond(&mut connection, id, "");
        connection.release(id).unwrap();

        assert!(connection.stream().is_output_closed());
        assert!(output(&connection).starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(output(&connection).contains("connection: close\r\n"));
    }

    #[test]
    fn malformed_head_is_answered_with_400() {
        let mut connection = connection();
        let id = connection.current().unwrap();

        let e = connection.feed(b"GET / HTTP/1.1\r\n: no-name\r\n\r\n").unwrap_err();
        assert!(matches!(e, HttpError::RequestError { .. }));
        assert_eq!(connection.current(), None);
        assert!(!connection.is_persistent());
        assert!(connection.channel(id).is_none());

        let mut headers = [httparse::EMPTY_HEADER; 4];
        let mut response = httparse::Response::new(&mut headers);
        let status = response.parse(connection.stream().pending_output()).unwrap();
        assert!(status.is_complete());
        assert_eq!(response.code, Some(400));
        assert!(response.headers.iter().any(|h| h.name == "connection" && h.value == b"close"));
        assert!(connection.stream().is_output_closed());
    }

    #[test]
    fn bad_request_follows_pipelined_response() {
        let mut connection = connection();
        let first = connection.current().unwrap();
        connection.feed(b"GET / HTTP/1.1\r\n\r\nBAD\r\n\r\n").unwrap();

        respond(&mut connection, first, "ok");
        let e = connection.release(first).unwrap_err();
        assert!(!e.is_misuse());

        let output = output(&connection);
        assert!(output.starts_with("HTTP/1.1 200 OK\r\ncontent-length: 2\r\n\r\nokHTTP/1.1 400 Bad Request\r\n"));
        assert!(connection.stream().is_output_closed());
    }

    #[test]
    fn header_limits_answer_400() {
        let config = ChannelConfig::new().with_max_headers(1);
        let mut connection = Connection::with_config(config, noop);

        let e = connection.feed(b"GET / HTTP/1.1\r\nA: 1\r\nB: 2\r\n\r\n").unwrap_err();
        assert!(matches!(e, HttpError::RequestError { .. }));
        assert!(output(&connection).starts_with("HTTP/1.1 400 Bad Request\r\n"));
    }

    #[test]
    fn misuse() {
        let mut connection = connection();
        let id = connection.current().unwrap();

        assert!(connection.release(id).unwrap_err().is_misuse());
        assert!(connection.start_sending(id).unwrap_err().is_misuse());
        assert!(connection.channel_mut(id).unwrap().send_body_mut().unwrap_err().is_misuse());
        assert!(connection.release(ChannelId(42)).unwrap_err().is_misuse());

        connection.feed(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert!(connection.release(id).unwrap_err().is_misuse(), "response body still open");

        respond(&mut connection, id, "x");
        connection.start_sending(id).unwrap();
        assert!(connection.channel_mut(id).unwrap().response_mut().unwrap_err().is_misuse());

        connection.release(id).unwrap();
        assert!(connection.release(id).unwrap_err().is_misuse());

        connection.close_input().unwrap();
        assert!(connection.feed(b"GET").unwrap_err().is_misuse());
    }

    #[test]
    fn close_output_drops_pending_response() {
        let mut connection = connection();
        let id = connection.current().unwrap();
        let (all_done, done) = flag();
        connection.channel_mut(id).unwrap().set_completed_callback(move |_| {
            done.store(true, Ordering::SeqCst);
            Ok(())
        });

        connection.feed(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        connection.close_output().unwrap();
        assert!(!connection.channel(id).unwrap().keep_alive());

        respond(&mut connection, id, "lost");
        connection.start_sending(id).unwrap();

        assert!(connection.stream().pending_output().is_empty());
        assert!(all_done.load(Ordering::SeqCst));
    }

    #[test]
    fn http10_keep_alive() {
        let mut connection = connection();
        let first = connection.current().unwrap();
        connection
            .feed(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\nGET / HTTP/1.0\r\n\r\n")
            .unwrap();
        assert!(connection.channel(first).unwrap().keep_alive());

        respond(&mut connection, first, "one");
        let second = connection.release(first).unwrap().unwrap();
        assert!(!connection.channel(second).unwrap().keep_alive());

        respond(&mut connection, second, "two");
        connection.release(second).unwrap();

        assert_eq!(
            output(&connection),
            "HTTP/1.0 200 OK\r\nconnection: keep-alive\r\ncontent-length: 3\r\n\r\noneHTTP/1.0 200 OK\r\ncontent-length: 3\r\n\r\ntwo"
        );
        assert!(connection.stream().is_output_closed());
        assert!(!connection.is_persistent());
    }

    #[test]
    fn early_response_keeps_reading_the_body() {
        let mut connection = connection();
        let id = connection.current().unwrap();
        let completed = Arc::new(AtomicUsize::new(0));
        let completed_calls = Arc::clone(&completed);
        connection.channel_mut(id).unwrap().set_completed_callback(move |_| {
            completed_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        connection.feed(b"POST / HTTP/1.0\r\nContent-Length: 10\r\n\r\n12345").unwrap();
        respond(&mut connection, id, "early");
        connection.start_sending(id).unwrap();

        assert_eq!(connection.current(), Some(id));
        assert!(!connection.stream().is_output_closed());
        assert_eq!(completed.load(Ordering::SeqCst), 0);

        connection.feed(b"67890").unwrap();
        let channel = connection.channel(id).unwrap();
        assert_eq!(channel.recv_body().received_len(), 10);
        assert!(channel.recv_body().is_closed());
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(connection.current(), None);
        assert!(connection.stream().is_output_closed());
        assert!(!connection.is_persistent());

        connection.close_input().unwrap();
        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(output(&connection), "HTTP/1.0 200 OK\r\ncontent-length: 5\r\n\r\nearly");
    }

    #[test]
    fn broken_response_length_is_reported_once() {
        let mut connection = connection();
        let id = connection.current().unwrap();
        connection.feed(b"GET / HTTP/1.1\r\n\r\n").unwrap();

        let channel = connection.channel_mut(id).unwrap();
        channel.response_mut().unwrap().headers_mut().insert(CONTENT_LENGTH, HeaderValue::from_static("5"));
        respond(&mut connection, id, "ab");

        let e = connection.start_sending(id).unwrap_err();
        assert!(matches!(e, HttpError::ResponseError { .. }));
        assert!(connection.stream().is_output_closed());
        assert!(!connection.is_persistent());

        connection.drive().unwrap();
        connection.release(id).unwrap();
        connection.drive().unwrap();
        connection.close_input().unwrap();

        assert_eq!(connection.channel_ids().count(), 0);
        assert_eq!(connection.current(), None);
    }
}
