//! Core HTTP protocol abstractions.
//!
//! This module provides the message model shared by the codecs and the channel:
//!
//! - **Message Handling** ([`message`]): Core message types and payload processing
//!   - [`Message`]: Represents either a head or payload chunks
//!   - [`PayloadItem`]: Handles individual payload chunks and EOF
//!   - [`BodyFraming`]: How a body is delimited on the wire
//!
//! - **Headers** ([`HeaderTable`]): ordered, case-insensitive header storage
//!
//! - **Heads** ([`RequestHead`], [`ResponseHead`])
//!
//! - **Bodies** ([`body`]): [`body::RecvBody`] and [`body::SendBody`]
//!
//! - **Error Handling** ([`error`]):
//!   - [`HttpError`]: Top-level error type
//!   - [`ParseError`]: Request parsing errors
//!   - [`SendError`]: Response sending errors

mod message;
pub use message::BodyFraming;
pub use message::Message;
pub use message::PayloadItem;

mod header_table;
pub use header_table::HeaderTable;

mod request;
pub use request::RequestHead;
pub(crate) use request::protocol_str;

mod response;
pub use response::ResponseHead;

mod error;
pub use error::HttpError;
pub use error::ParseError;
pub use error::SendError;

pub mod body;
