//! HTTP request head.
//!
//! A [`RequestHead`] only exists once the blank line ending the head has been
//! parsed, so the application never observes a partially parsed request.

use bytes::Bytes;
use http::header::CONNECTION;
use http::{Method, Version};

use crate::protocol::HeaderTable;

/// Represents a parsed HTTP request head.
///
/// The target is kept exactly as received (no percent decoding), and the raw
/// head bytes are kept alongside the structured header table for diagnostics.
#[derive(Debug, Clone)]
pub struct RequestHead {
    method: Method,
    target: String,
    version: Version,
    headers: HeaderTable,
    raw: Bytes,
}

impl RequestHead {
    pub(crate) fn new(method: Method, target: String, version: Version, headers: HeaderTable, raw: Bytes) -> Self {
        Self { method, target, version, headers, raw }
    }

    /// Returns a reference to the request's HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request target as received.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The target up to the first `?`, not decoded.
    pub fn path(&self) -> &str {
        self.target.split_once('?').map_or(self.target.as_str(), |(path, _)| path)
    }

    /// The target after the first `?`, not decoded.
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }

    /// Returns the request's HTTP version.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Returns the protocol token, `HTTP/1.0` or `HTTP/1.1`.
    pub fn protocol(&self) -> &'static str {
        protocol_str(self.version)
    }

    /// Returns a reference to the request's headers.
    pub fn headers(&self) -> &HeaderTable {
        &self.headers
    }

    /// Shortcut for `headers().header(name)`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.header(name)
    }

    /// The head as received, with folded header lines normalized.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// Determines if this request may carry a body based on its HTTP method.
    ///
    /// Returns false for methods that typically don't have bodies:
    /// - GET
    /// - HEAD
    /// - DELETE
    /// - OPTIONS
    /// - CONNECT
    pub fn need_body(&self) -> bool {
        !matches!(self.method(), &Method::GET | &Method::HEAD | &Method::DELETE | &Method::OPTIONS | &Method::CONNECT)
    }

    /// Whether the request asks for the connection to stay open after this exchange.
    ///
    /// HTTP/1.1 is persistent unless `Connection: close` is present, HTTP/1.0 only
    /// with an explicit `Connection: keep-alive`.
    pub fn is_persistent(&self) -> bool {
        if self.headers.has_token(CONNECTION, "close") {
            return false;
        }

        match self.version {
            Version::HTTP_10 => self.headers.has_token(CONNECTION, "keep-alive"),
            _ => true,
        }
    }
}

pub(crate) fn protocol_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_09 => "HTTP/0.9",
        _ => "HTTP/1.1",
    }
}
