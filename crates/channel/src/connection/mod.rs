//! Async transport for a [`Connection`](crate::channel::Connection).
//!
//! [`HttpConnection`] pumps bytes between a tokio reader/writer pair and the
//! synchronous channel engine, so any `AsyncRead`/`AsyncWrite` can serve HTTP.

mod http_connection;

pub use http_connection::HttpConnection;
