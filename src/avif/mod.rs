//! AVIF (AV1-in-HEIF) decode and encode, stills and image sequences.
//!
//! The ISO-BMFF container layer (demux and assembly) lives in this
//! module; AV1 bitstream decode is delegated to `dav1d` and encode to
//! `ravif`. Includes the HDR-to-SDR tone mapping path for PQ/HLG
//! BT.2020 sources.

mod boxes;
mod decode;
mod encode;
mod mux;
mod profile;
mod tonemap;

pub use decode::AvifDecoder;
pub use encode::AvifEncoder;
