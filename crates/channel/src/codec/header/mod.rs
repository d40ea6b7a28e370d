//! Head codecs.
//!
//! - [`HeadDecoder`]: incremental request head parser with header folding,
//!   bare `\r`/`\n` line ends and size limits
//! - [`HeadEncoder`]: response status line and headers, including the framing
//!   headers of the body

mod head_decoder;
mod head_encoder;

pub use head_decoder::HeadDecoder;
pub use head_encoder::HeadEncoder;
