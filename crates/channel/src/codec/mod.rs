//! HTTP/1.x codecs.
//!
//! Every codec implements the `tokio_util::codec` traits over `BytesMut`, so
//! it can be driven by a channel over an in-memory buffer as well as wrapped
//! in a `FramedRead`/`FramedWrite`.
//!
//! - Request side:
//!   - [`RequestDecoder`]: head, then body, of one request
//!   - [`HeadDecoder`]: the request head alone, with header folding
//!   - [`PayloadDecoder`]: length, chunked, close-delimited or empty bodies
//!
//! - Response side:
//!   - [`ResponseEncoder`]: head, then body, of one response
//!   - [`HeadEncoder`]: status line and headers
//!   - [`PayloadEncoder`]: length, chunked, close-delimited or empty bodies
//!
//! # Example
//!
//! ```
//! use bytes::BytesMut;
//! use micro_channel::codec::RequestDecoder;
//! use micro_channel::protocol::{BodyFraming, Message};
//! use tokio_util::codec::Decoder;
//!
//! let mut decoder = RequestDecoder::default();
//! let mut buffer = BytesMut::from("GET /index.html HTTP/1.1\r\nHost: a\r\n\r\n");
//!
//! let Some(Message::Header((head, framing))) = decoder.decode(&mut buffer).unwrap() else {
//!     panic!("head is complete");
//! };
//! assert_eq!(head.path(), "/index.html");
//! assert_eq!(framing, BodyFraming::Empty);
//! ```

mod body;
mod header;
mod request_decoder;
mod response_encoder;

pub use body::{PayloadDecoder, PayloadEncoder};
pub use header::{HeadDecoder, HeadEncoder};
pub use request_decoder::RequestDecoder;
pub use response_encoder::ResponseEncoder;
