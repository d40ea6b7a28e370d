//! Request and response bodies as seen by the application.
//!
//! - [`RecvBody`]: the readable request body, filled by the channel as the payload
//!   decoder produces data and closed exactly where the framing ends it
//! - [`SendBody`]: the writable response body, a queue the channel drains into the
//!   byte stream once sending has started

mod recv_body;
mod send_body;

pub use recv_body::RecvBody;
pub use send_body::SendBody;
