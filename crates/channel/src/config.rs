//! Limits shared by every channel of a connection.

/// Maximum number of headers allowed in a request
pub const DEFAULT_MAX_HEADER_NUM: usize = 64;

/// Maximum size in bytes allowed for the entire head section
pub const DEFAULT_MAX_HEADER_BYTES: usize = 8 * 1024;

/// Initial capacity of the transport read buffer
pub const DEFAULT_READ_CAPACITY: usize = 8 * 1024;

/// Channel configuration.
///
/// ```
/// use micro_channel::ChannelConfig;
///
/// let config = ChannelConfig::default().with_max_header_bytes(16 * 1024).with_max_headers(100);
/// assert_eq!(config.max_header_bytes(), 16 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    max_header_bytes: usize,
    max_headers: usize,
    read_capacity: usize,
}

impl ChannelConfig {
    pub const fn new() -> Self {
        Self {
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_headers: DEFAULT_MAX_HEADER_NUM,
            read_capacity: DEFAULT_READ_CAPACITY,
        }
    }

    #[must_use]
    pub const fn with_max_header_bytes(mut self, max_header_bytes: usize) -> Self {
        self.max_header_bytes = max_header_bytes;
        self
    }

    #[must_use]
    pub const fn with_max_headers(mut self, max_headers: usize) -> Self {
        self.max_headers = max_headers;
        self
    }

    #[must_use]
    pub const fn with_read_capacity(mut self, read_capacity: usize) -> Self {
        self.read_capacity = read_capacity;
        self
    }

    pub const fn max_header_bytes(&self) -> usize {
        self.max_header_bytes
    }

    pub const fn max_headers(&self) -> usize {
        self.max_headers
    }

    pub const fn read_capacity(&self) -> usize {
        self.read_capacity
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new()
    }
}
