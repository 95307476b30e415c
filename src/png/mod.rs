//! PNG and APNG (`acTL`/`fcTL`/`fdAT`) decode and encode.
//!
//! The `png` crate handles filtering, interlacing and zlib; this module
//! owns the BGRA canonical layout, animation composition, the `iCCP`
//! profile carriage, and the minimal-diff animation encoder.

mod decode;
mod encode;

pub use decode::PngDecoder;
pub use encode::{ApngEncoder, PngEncoder};

pub(crate) const DEFAULT_COMPRESSION: i64 = 6;
