//! HTTP channels and the connection that sequences them.
//!
//! - [`HttpChannel`]: one request and its response, driven by callbacks
//! - [`Connection`]: the channels of one byte stream, reading one request at
//!   a time and writing responses in request order
//! - [`ChannelFactory`]: sets up each channel a connection creates

mod connection;
mod factory;
mod http_channel;

pub use connection::Connection;
pub use factory::ChannelFactory;
pub use http_channel::{ChannelCallback, ChannelId, ChannelState, HttpChannel};
