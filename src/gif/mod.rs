//! GIF87a/GIF89a decode and encode.
//!
//! LZW work is delegated to the `gif` crate; this module scans the stream
//! for animation metadata (NETSCAPE loop extension, screen descriptor
//! background), resolves local/global color tables, and composes frames
//! onto the canvas honoring transparency and disposal.

mod decode;
mod encode;

pub use decode::GifDecoder;
pub use encode::GifEncoder;
