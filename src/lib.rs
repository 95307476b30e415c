//! # framecodec
//!
//! Image codec core with animation support: per-format decoders and
//! encoders unified over a shared pixel buffer, the [`PixelMatrix`].
//!
//! ## Formats
//!
//! - **JPEG** (JFIF/EXIF, baseline and progressive), APP2 ICC, APP1
//!   orientation
//! - **PNG / APNG** (`acTL`/`fcTL`/`fdAT`), `iCCP`
//! - **GIF** (87a/89a) with the NETSCAPE2.0 loop extension
//! - **WebP** (VP8/VP8L) stills and animations, `ICCP`/`EXIF`/`XMP `
//! - **AVIF** stills and image sequences (`avif` feature; AV1 decode
//!   links the system dav1d)
//!
//! Decoders borrow the input bytes, parse the header eagerly, and fill
//! caller-supplied matrices frame by frame. Animated decoders compose
//! each frame onto the canvas (dispose + blend) before handing it out.
//! Encoders write into caller-supplied fixed buffers and never
//! reallocate them.
//!
//! ## Pixel layout
//!
//! The canonical in-memory channel order is BGR/BGRA, 8 bits per
//! channel. Grayscale is the third supported layout.
//!
//! ## Usage
//!
//! ```no_run
//! use framecodec::{AnyDecoder, PixelMatrix};
//!
//! let bytes = std::fs::read("animation.gif")?;
//! let mut decoder = AnyDecoder::new(&bytes)?;
//! let mut canvas = PixelMatrix::new(
//!     decoder.width(),
//!     decoder.height(),
//!     decoder.pixel_type(),
//! )?;
//! while decoder.has_more_frames() {
//!     decoder.decode_into(&mut canvas)?;
//!     // use the composed canvas
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]

mod anim;
mod compose;
mod error;
mod exif;
mod limits;
mod matrix;
mod options;
mod orient;
mod pixel;
mod sink;

mod gif;
mod jpeg;
mod png;
mod webp;

#[cfg(feature = "avif")]
mod avif;

pub use anim::{AnimationHeader, Blend, Dispose, FrameHeader, FrameParams};
pub use compose::{clear_region, copy_to_region};
pub use error::{DecodeError, EncodeError, MatrixError};
pub use gif::{GifDecoder, GifEncoder};
pub use jpeg::{JpegDecoder, JpegEncoder};
pub use limits::Limits;
pub use matrix::{PixelMatrix, PixelSlice, PixelSliceMut};
pub use options::{EncodeOption, OptionKey};
pub use orient::{Orientation, orientation_transform};
pub use pixel::{ImageFormat, PixelType};
pub use png::{ApngEncoder, PngDecoder, PngEncoder};
pub use webp::{WebpDecoder, WebpEncoder};

#[cfg(feature = "avif")]
pub use avif::{AvifDecoder, AvifEncoder};

// ── Format detection ──────────────────────────────────────────────────

/// Detect the image format from the first bytes.
///
/// Returns `None` if the data doesn't match any supported signature.
pub fn detect_format(data: &[u8]) -> Option<ImageFormat> {
    if data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8 {
        return Some(ImageFormat::Jpeg);
    }
    if data.len() >= 4 && &data[0..4] == b"\x89PNG" {
        return Some(ImageFormat::Png);
    }
    if data.len() >= 6 && (&data[0..6] == b"GIF87a" || &data[0..6] == b"GIF89a") {
        return Some(ImageFormat::Gif);
    }
    if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        return Some(ImageFormat::Webp);
    }
    if is_avif_brand(data) {
        return Some(ImageFormat::Avif);
    }
    None
}

/// `ftyp` box carrying an `avif`/`avis` brand.
fn is_avif_brand(data: &[u8]) -> bool {
    if data.len() < 16 || &data[4..8] != b"ftyp" {
        return false;
    }
    let size = u32::from_be_bytes(data[0..4].try_into().expect("length checked")) as usize;
    let end = size.min(data.len());
    if end < 16 {
        return false;
    }
    let major = &data[8..12];
    if major == b"avif" || major == b"avis" {
        return true;
    }
    data[16..end]
        .chunks_exact(4)
        .any(|brand| brand == b"avif" || brand == b"avis")
}

// ── Decoder dispatch ─────────────────────────────────────────────────

/// The decoder for whichever format the input sniffs as.
///
/// One variant per codec; the common decoder surface is available
/// through the enum's methods.
pub enum AnyDecoder<'a> {
    Jpeg(JpegDecoder<'a>),
    Png(PngDecoder<'a>),
    Gif(GifDecoder<'a>),
    Webp(WebpDecoder<'a>),
    #[cfg(feature = "avif")]
    Avif(AvifDecoder<'a>),
}

impl<'a> AnyDecoder<'a> {
    /// Sniff `data` and construct the matching decoder.
    pub fn new(data: &'a [u8]) -> Result<Self, DecodeError> {
        Self::with_limits(data, &Limits::default())
    }

    /// Sniff and construct with resource limits applied at header parse.
    pub fn with_limits(data: &'a [u8], limits: &Limits) -> Result<Self, DecodeError> {
        match detect_format(data) {
            Some(ImageFormat::Jpeg) => {
                Ok(Self::Jpeg(JpegDecoder::with_limits(data, limits)?))
            }
            Some(ImageFormat::Png) => Ok(Self::Png(PngDecoder::with_limits(data, limits)?)),
            Some(ImageFormat::Gif) => Ok(Self::Gif(GifDecoder::with_limits(data, limits)?)),
            Some(ImageFormat::Webp) => Ok(Self::Webp(WebpDecoder::with_limits(data, limits)?)),
            Some(ImageFormat::Avif) => {
                #[cfg(feature = "avif")]
                {
                    Ok(Self::Avif(AvifDecoder::with_limits(data, false, limits)?))
                }
                #[cfg(not(feature = "avif"))]
                {
                    Err(DecodeError::UnsupportedFeature(
                        "AVIF support requires the 'avif' feature".into(),
                    ))
                }
            }
            None => Err(DecodeError::UnrecognizedFormat),
        }
    }

    /// The sniffed format of this decoder.
    pub fn format(&self) -> ImageFormat {
        match self {
            Self::Jpeg(_) => ImageFormat::Jpeg,
            Self::Png(_) => ImageFormat::Png,
            Self::Gif(_) => ImageFormat::Gif,
            Self::Webp(_) => ImageFormat::Webp,
            #[cfg(feature = "avif")]
            Self::Avif(_) => ImageFormat::Avif,
        }
    }

    pub fn width(&self) -> u32 {
        match self {
            Self::Jpeg(d) => d.width(),
            Self::Png(d) => d.width(),
            Self::Gif(d) => d.width(),
            Self::Webp(d) => d.width(),
            #[cfg(feature = "avif")]
            Self::Avif(d) => d.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Self::Jpeg(d) => d.height(),
            Self::Png(d) => d.height(),
            Self::Gif(d) => d.height(),
            Self::Webp(d) => d.height(),
            #[cfg(feature = "avif")]
            Self::Avif(d) => d.height(),
        }
    }

    pub fn pixel_type(&self) -> PixelType {
        match self {
            Self::Jpeg(d) => d.pixel_type(),
            Self::Png(d) => d.pixel_type(),
            Self::Gif(d) => d.pixel_type(),
            Self::Webp(d) => d.pixel_type(),
            #[cfg(feature = "avif")]
            Self::Avif(d) => d.pixel_type(),
        }
    }

    /// Stream-level metadata (frame count, loop count, ICC, ...).
    pub fn header(&self) -> &AnimationHeader {
        match self {
            Self::Jpeg(d) => d.header(),
            Self::Png(d) => d.header(),
            Self::Gif(d) => d.header(),
            Self::Webp(d) => d.header(),
            #[cfg(feature = "avif")]
            Self::Avif(d) => d.header(),
        }
    }

    /// Copy the embedded ICC profile into `buf`; returns bytes copied.
    pub fn icc(&self, buf: &mut [u8]) -> usize {
        self.header().icc_into(buf)
    }

    /// EXIF orientation; `Normal` for formats without one.
    pub fn orientation(&self) -> Orientation {
        match self {
            Self::Jpeg(d) => d.orientation(),
            Self::Png(d) => d.orientation(),
            Self::Gif(d) => d.orientation(),
            Self::Webp(d) => d.orientation(),
            #[cfg(feature = "avif")]
            Self::Avif(_) => Orientation::Normal,
        }
    }

    pub fn has_more_frames(&self) -> bool {
        match self {
            Self::Jpeg(d) => d.has_more_frames(),
            Self::Png(d) => d.has_more_frames(),
            Self::Gif(d) => d.has_more_frames(),
            Self::Webp(d) => d.has_more_frames(),
            #[cfg(feature = "avif")]
            Self::Avif(d) => d.has_more_frames(),
        }
    }

    /// Decode the next frame into `mat` and advance the cursor.
    pub fn decode_into(&mut self, mat: &mut PixelMatrix<'_>) -> Result<(), DecodeError> {
        match self {
            Self::Jpeg(d) => d.decode_into(mat),
            Self::Png(d) => d.decode_into(mat),
            Self::Gif(d) => d.decode_into(mat),
            Self::Webp(d) => d.decode_into(mat),
            #[cfg(feature = "avif")]
            Self::Avif(d) => d.decode_into(mat),
        }
    }

    /// Advance past the next frame without handing out pixels.
    pub fn skip_frame(&mut self) -> Result<(), DecodeError> {
        match self {
            Self::Jpeg(d) => d.skip_frame(),
            Self::Png(d) => d.skip_frame(),
            Self::Gif(d) => d.skip_frame(),
            Self::Webp(d) => d.skip_frame(),
            #[cfg(feature = "avif")]
            Self::Avif(d) => d.skip_frame(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_signatures() {
        assert_eq!(detect_format(&[0xFF, 0xD8, 0xFF]), Some(ImageFormat::Jpeg));
        assert_eq!(
            detect_format(b"\x89PNG\r\n\x1a\n"),
            Some(ImageFormat::Png)
        );
        assert_eq!(detect_format(b"GIF89a\x01\x00"), Some(ImageFormat::Gif));
        assert_eq!(detect_format(b"GIF87a\x01\x00"), Some(ImageFormat::Gif));
        assert_eq!(
            detect_format(b"RIFF\x00\x00\x00\x00WEBPVP8 "),
            Some(ImageFormat::Webp)
        );
        assert_eq!(detect_format(b"RIFF\x00\x00\x00\x00WAVE"), None);
        assert_eq!(detect_format(b"BM"), None);
        assert_eq!(detect_format(&[]), None);
    }

    #[test]
    fn detect_avif_brands() {
        let mut data = Vec::new();
        data.extend_from_slice(&20u32.to_be_bytes());
        data.extend_from_slice(b"ftypavif");
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(b"mif1");
        assert_eq!(detect_format(&data), Some(ImageFormat::Avif));

        // avis as a compatible brand only
        let mut data = Vec::new();
        data.extend_from_slice(&20u32.to_be_bytes());
        data.extend_from_slice(b"ftypmsf1");
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(b"avis");
        assert_eq!(detect_format(&data), Some(ImageFormat::Avif));

        let mut data = Vec::new();
        data.extend_from_slice(&16u32.to_be_bytes());
        data.extend_from_slice(b"ftypisom");
        data.extend_from_slice(&[0; 4]);
        assert_eq!(detect_format(&data), None);
    }
}
