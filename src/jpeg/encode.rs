use crate::error::EncodeError;
use crate::matrix::PixelSlice;
use crate::options::{self, EncodeOption, OptionKey};
use crate::pixel::PixelType;

use super::DEFAULT_QUALITY;

/// APP2 segments carry at most this much profile data after the
/// `ICC_PROFILE\0` header and sequence bytes.
const ICC_CHUNK_MAX: usize = 65519;

/// JPEG encoder over a caller-supplied output buffer.
///
/// The buffer is never reallocated; output that does not fit fails with
/// [`EncodeError::BufferTooSmall`].
pub struct JpegEncoder<'dst> {
    dst: &'dst mut [u8],
    icc: Option<Vec<u8>>,
}

impl<'dst> JpegEncoder<'dst> {
    /// Record the output buffer and an optional ICC profile to embed.
    pub fn new(dst: &'dst mut [u8], icc: Option<&[u8]>) -> Self {
        Self {
            dst,
            icc: icc.filter(|p| !p.is_empty()).map(<[u8]>::to_vec),
        }
    }

    /// Compress `src` into the output buffer and return the byte count.
    ///
    /// Recognized options: `Quality` (1-100, default 95) and `Progressive`
    /// (0/1, default 0). 4-channel input discards alpha; chroma
    /// subsampling is 4:2:0 for color and none for grayscale.
    pub fn encode(
        &mut self,
        src: PixelSlice<'_>,
        opts: &[EncodeOption],
    ) -> Result<usize, EncodeError> {
        if src.width() == 0 || src.height() == 0 || src.stride() == 0 {
            return Err(EncodeError::InvalidDimensions {
                width: src.width(),
                height: src.height(),
                stride: src.stride(),
            });
        }
        if src.width() > u32::from(u16::MAX) || src.height() > u32::from(u16::MAX) {
            return Err(EncodeError::InvalidDimensions {
                width: src.width(),
                height: src.height(),
                stride: src.stride(),
            });
        }

        let quality = options::lookup_clamped(opts, OptionKey::Quality, 1, 100, DEFAULT_QUALITY);
        let progressive = options::lookup(opts, OptionKey::Progressive).unwrap_or(0) != 0;

        let (color_type, sampling) = match src.pixel_type() {
            PixelType::Gray8 => (jpeg_encoder::ColorType::Luma, None),
            PixelType::Bgr8 => (
                jpeg_encoder::ColorType::Bgr,
                Some(jpeg_encoder::SamplingFactor::F_2_2),
            ),
            PixelType::Bgra8 => (
                jpeg_encoder::ColorType::Bgra,
                Some(jpeg_encoder::SamplingFactor::F_2_2),
            ),
        };

        let mut out = Vec::new();
        let mut encoder = jpeg_encoder::Encoder::new(&mut out, quality as u8);
        encoder.set_progressive(progressive);
        if let Some(factor) = sampling {
            encoder.set_sampling_factor(factor);
        }
        if let Some(icc) = &self.icc {
            add_icc_segments(&mut encoder, icc).map_err(map_err)?;
        }

        let pixels = src.to_contiguous();
        encoder
            .encode(
                &pixels,
                src.width() as u16,
                src.height() as u16,
                color_type,
            )
            .map_err(map_err)?;

        if out.len() > self.dst.len() {
            return Err(EncodeError::BufferTooSmall {
                needed: out.len(),
                capacity: self.dst.len(),
            });
        }
        self.dst[..out.len()].copy_from_slice(&out);
        Ok(out.len())
    }
}

/// Write the profile as standard multi-chunk APP2 markers:
/// `ICC_PROFILE\0` + 1-based sequence number + chunk count + data.
fn add_icc_segments<W: jpeg_encoder::JfifWrite>(
    encoder: &mut jpeg_encoder::Encoder<W>,
    icc: &[u8],
) -> Result<(), jpeg_encoder::EncodingError> {
    let chunks: Vec<&[u8]> = icc.chunks(ICC_CHUNK_MAX).collect();
    let total = chunks.len() as u8;
    for (i, chunk) in chunks.iter().enumerate() {
        let mut payload = Vec::with_capacity(14 + chunk.len());
        payload.extend_from_slice(b"ICC_PROFILE\0");
        payload.push(i as u8 + 1);
        payload.push(total);
        payload.extend_from_slice(chunk);
        encoder.add_app_segment(2, &payload)?;
    }
    Ok(())
}

fn map_err(err: jpeg_encoder::EncodingError) -> EncodeError {
    EncodeError::Unknown(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::PixelMatrix;

    #[test]
    fn rejects_zero_dimensions() {
        let src = PixelMatrix::new(0, 4, PixelType::Bgr8).unwrap();
        let mut buf = [0u8; 256];
        let mut enc = JpegEncoder::new(&mut buf, None);
        let err = enc.encode(src.as_slice(), &[]).unwrap_err();
        assert_eq!(err.code(), 3);
    }

    #[test]
    fn emits_jpeg_magic() {
        let mut src = PixelMatrix::new(4, 4, PixelType::Bgr8).unwrap();
        src.set_fill(255, 128, 0, 0);
        let mut buf = [0u8; 2048];
        let mut enc = JpegEncoder::new(&mut buf, None);
        let n = enc
            .encode(src.as_slice(), &[(OptionKey::Quality, 90)])
            .unwrap();
        assert!(n > 0);
        assert_eq!(&buf[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn tiny_buffer_is_too_small() {
        let mut src = PixelMatrix::new(16, 16, PixelType::Bgr8).unwrap();
        src.set_fill(1, 2, 3, 0);
        let mut buf = [0u8; 8];
        let mut enc = JpegEncoder::new(&mut buf, None);
        let err = enc.encode(src.as_slice(), &[]).unwrap_err();
        assert!(matches!(err, EncodeError::BufferTooSmall { .. }));
    }
}
