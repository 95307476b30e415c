//! WebP (VP8/VP8L in RIFF) decode and encode.
//!
//! Bitstream work is delegated to `image-webp`; the RIFF container layer
//! (per-frame `ANMF` metadata, `ANIM` parameters, `ICCP`/`XMP` chunks,
//! and the still-to-animation container rebuild on encode) lives here.

mod decode;
mod encode;
mod riff;

pub use decode::WebpDecoder;
pub use encode::WebpEncoder;
