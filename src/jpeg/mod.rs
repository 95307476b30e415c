//! JPEG (JFIF/EXIF) decode and encode.
//!
//! Pixel work is delegated to `jpeg-decoder`/`jpeg-encoder`; this module
//! adds the BGR canonical layout, APP1 orientation scan, and APP2 ICC
//! handling.

mod decode;
mod encode;

pub use decode::JpegDecoder;
pub use encode::JpegEncoder;

pub(crate) const DEFAULT_QUALITY: i64 = 95;
