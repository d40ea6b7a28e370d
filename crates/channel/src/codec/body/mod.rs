//! Body codecs.
//!
//! ## Decoders
//! - `ChunkedDecoder`: chunked transfer coding
//! - `LengthDecoder`: `Content-Length` framed bodies
//! - [`PayloadDecoder`]: selects one of the above, or a close-delimited or empty body
//!
//! ## Encoders
//! - `ChunkedEncoder`: chunked transfer coding
//! - `LengthEncoder`: `Content-Length` framed bodies, rejects length mismatches
//! - [`PayloadEncoder`]: selects one of the above, or a close-delimited or empty body

mod chunked_decoder;
mod chunked_encoder;
mod length_decoder;
mod length_encoder;
mod payload_decoder;
mod payload_encoder;

pub use payload_decoder::PayloadDecoder;
pub use payload_encoder::PayloadEncoder;
