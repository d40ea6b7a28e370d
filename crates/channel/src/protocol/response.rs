//! HTTP response head.
//!
//! The response head is writable by the application until the channel starts
//! sending; the send side codec then adds the framing headers it needs.

use http::{StatusCode, Version};

use crate::protocol::HeaderTable;

#[derive(Debug, Clone)]
pub struct ResponseHead {
    status: StatusCode,
    version: Version,
    headers: HeaderTable,
}

impl ResponseHead {
    pub fn new(version: Version) -> Self {
        Self { status: StatusCode::OK, version, headers: HeaderTable::new() }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    pub fn headers(&self) -> &HeaderTable {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderTable {
        &mut self.headers
    }
}

impl Default for ResponseHead {
    fn default() -> Self {
        Self::new(Version::HTTP_11)
    }
}
