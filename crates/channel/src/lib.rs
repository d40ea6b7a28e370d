//! A transport-agnostic HTTP/1.1 channel engine
//!
//! This crate parses pipelined HTTP/1.1 requests from an in-memory byte stream
//! and writes the responses back in request order. It never performs I/O by
//! itself: a transport feeds the bytes it read into a [`channel::Connection`]
//! and writes out whatever the connection produced. [`connection::HttpConnection`]
//! is such a transport for tokio readers and writers.
//!
//! # Features
//!
//! - HTTP/1.0 and HTTP/1.1 requests, with keep-alive and pipelining
//! - Request heads accepting `\n`, `\r\n` and bare `\r` line ends, with folded headers
//! - `Content-Length`, chunked and close-delimited request bodies
//! - Streaming responses, framed by length, chunked or by closing the connection
//! - Event callbacks per exchange: head ready, data received, data flushed, completed
//! - `400 Bad Request` on malformed heads, header count and size limits
//!
//! # Example
//!
//! ```
//! use micro_channel::channel::{Connection, HttpChannel};
//!
//! let mut connection = Connection::new(|channel: &mut HttpChannel| {
//!     channel.set_head_ready_callback(|channel| {
//!         let body = channel.send_body_mut()?;
//!         body.append("Hello World!\r\n")?;
//!         body.close();
//!         channel.release()
//!     });
//! });
//!
//! connection.feed(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").unwrap();
//!
//! let output = connection.take_output();
//! assert_eq!(&output[..], b"HTTP/1.1 200 OK\r\ncontent-length: 14\r\n\r\nHello World!\r\n");
//! ```
//!
//! # Architecture
//!
//! - [`stream`]: the in-memory byte stream between transport and channels
//! - [`codec`]: request decoding and response encoding
//! - [`protocol`]: heads, bodies, framing and errors
//! - [`channel`]: the per-exchange state machine and the connection owning it
//! - [`handler`]: request handlers answering whole requests
//! - [`connection`]: the tokio transport
//!
//! ## Error Handling
//!
//! - [`protocol::HttpError`]: Top-level error type
//! - [`protocol::ParseError`]: Request parsing errors
//! - [`protocol::SendError`]: Response sending errors
//!
//! # Limitations
//!
//! - HTTP/1.x only
//! - No TLS support
//! - Default maximum header size: 8KB
//! - Default maximum number of headers: 64

pub mod channel;
pub mod codec;
pub mod config;
pub mod connection;
pub mod handler;
pub mod protocol;
pub mod stream;

pub use config::ChannelConfig;

mod utils;
pub(crate) use utils::ensure;
