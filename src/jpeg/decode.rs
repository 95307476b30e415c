use std::io::Cursor;

use crate::anim::AnimationHeader;
use crate::error::DecodeError;
use crate::exif::orientation_from_exif;
use crate::limits::Limits;
use crate::matrix::PixelMatrix;
use crate::orient::Orientation;
use crate::pixel::PixelType;

/// One-shot JPEG decoder over a borrowed byte buffer.
pub struct JpegDecoder<'a> {
    inner: jpeg_decoder::Decoder<Cursor<&'a [u8]>>,
    width: u32,
    height: u32,
    pixel: PixelType,
    orientation: Orientation,
    header: AnimationHeader,
    consumed: bool,
}

impl<'a> JpegDecoder<'a> {
    /// Parse the header (dimensions, pixel format, ICC, orientation).
    pub fn new(data: &'a [u8]) -> Result<Self, DecodeError> {
        Self::with_limits(data, &Limits::default())
    }

    /// Parse the header, rejecting images that exceed `limits`.
    pub fn with_limits(data: &'a [u8], limits: &Limits) -> Result<Self, DecodeError> {
        let mut inner = jpeg_decoder::Decoder::new(Cursor::new(data));
        inner.read_info().map_err(map_err)?;
        let info = inner
            .info()
            .ok_or_else(|| DecodeError::InvalidHeader("missing SOF".into()))?;
        limits.check(u32::from(info.width), u32::from(info.height))?;

        let pixel = match info.pixel_format {
            jpeg_decoder::PixelFormat::L8 | jpeg_decoder::PixelFormat::L16 => PixelType::Gray8,
            jpeg_decoder::PixelFormat::RGB24 | jpeg_decoder::PixelFormat::CMYK32 => PixelType::Bgr8,
        };

        let orientation = find_app1(data)
            .and_then(orientation_from_exif)
            .unwrap_or(Orientation::Normal);

        let header = AnimationHeader {
            canvas_width: u32::from(info.width),
            canvas_height: u32::from(info.height),
            frame_count: 1,
            icc: inner.icc_profile(),
            ..AnimationHeader::default()
        };

        Ok(Self {
            width: u32::from(info.width),
            height: u32::from(info.height),
            pixel,
            orientation,
            header,
            inner,
            consumed: false,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `Bgr8` for color and CMYK sources, `Gray8` for grayscale.
    pub fn pixel_type(&self) -> PixelType {
        self.pixel
    }

    /// EXIF orientation, `Normal` when no EXIF segment is present.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Stream metadata; a still reports one frame and no duration.
    pub fn header(&self) -> &AnimationHeader {
        &self.header
    }

    /// Copy the APP2 ICC profile into `buf`; returns bytes copied.
    pub fn icc(&self, buf: &mut [u8]) -> usize {
        self.header.icc_into(buf)
    }

    /// Whether the single frame is still pending.
    pub fn has_more_frames(&self) -> bool {
        !self.consumed
    }

    /// Consume the frame without decoding pixels.
    pub fn skip_frame(&mut self) -> Result<(), DecodeError> {
        if self.consumed {
            return Err(DecodeError::Eof);
        }
        self.consumed = true;
        Ok(())
    }

    /// Decode the image into `mat`, which must use this decoder's pixel
    /// type and be at least as large as the image. Row stride is honored.
    ///
    /// A second call fails with [`DecodeError::Eof`].
    pub fn decode_into(&mut self, mat: &mut PixelMatrix<'_>) -> Result<(), DecodeError> {
        if self.consumed {
            return Err(DecodeError::Eof);
        }
        if mat.pixel_type() != self.pixel {
            return Err(DecodeError::PixelTypeMismatch {
                expected: self.pixel,
                actual: mat.pixel_type(),
            });
        }
        if mat.width() < self.width || mat.height() < self.height {
            return Err(DecodeError::MatrixTooSmall {
                needed_width: self.width,
                needed_height: self.height,
                width: mat.width(),
                height: mat.height(),
            });
        }

        let data = self.inner.decode().map_err(map_err)?;
        let info = self
            .inner
            .info()
            .ok_or_else(|| DecodeError::CorruptFrame("info lost after decode".into()))?;
        self.consumed = true;

        let w = self.width as usize;
        match info.pixel_format {
            jpeg_decoder::PixelFormat::L8 => {
                for y in 0..self.height {
                    let src = &data[y as usize * w..(y as usize + 1) * w];
                    mat.row_mut(y)[..w].copy_from_slice(src);
                }
            }
            jpeg_decoder::PixelFormat::L16 => {
                // 16-bit grayscale is narrowed to 8 bits.
                for y in 0..self.height {
                    let src = &data[y as usize * w * 2..(y as usize + 1) * w * 2];
                    let dst = &mut mat.row_mut(y)[..w];
                    for (d, s) in dst.iter_mut().zip(src.chunks_exact(2)) {
                        *d = s[0];
                    }
                }
            }
            jpeg_decoder::PixelFormat::RGB24 => {
                for y in 0..self.height {
                    let src = &data[y as usize * w * 3..(y as usize + 1) * w * 3];
                    let dst = &mut mat.row_mut(y)[..w * 3];
                    for (d, s) in dst.chunks_exact_mut(3).zip(src.chunks_exact(3)) {
                        d[0] = s[2];
                        d[1] = s[1];
                        d[2] = s[0];
                    }
                }
            }
            jpeg_decoder::PixelFormat::CMYK32 => {
                // Adobe CMYK arrives inverted; fold K into each channel.
                for y in 0..self.height {
                    let src = &data[y as usize * w * 4..(y as usize + 1) * w * 4];
                    let dst = &mut mat.row_mut(y)[..w * 3];
                    for (d, s) in dst.chunks_exact_mut(3).zip(src.chunks_exact(4)) {
                        let k = u16::from(s[3]);
                        d[0] = (u16::from(s[2]) * k / 255) as u8;
                        d[1] = (u16::from(s[1]) * k / 255) as u8;
                        d[2] = (u16::from(s[0]) * k / 255) as u8;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Locate the APP1 (EXIF) payload by walking the marker segments.
fn find_app1(data: &[u8]) -> Option<&[u8]> {
    if data.len() < 4 || data[0] != 0xFF || data[1] != 0xD8 {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= data.len() {
        if data[pos] != 0xFF {
            return None;
        }
        let marker = data[pos + 1];
        match marker {
            // Standalone markers have no length field.
            0xD0..=0xD9 | 0x01 => {
                pos += 2;
                continue;
            }
            // Start of scan: entropy-coded data follows, stop scanning.
            0xDA => return None,
            _ => {}
        }
        let len = usize::from(u16::from_be_bytes([data[pos + 2], data[pos + 3]]));
        if len < 2 || pos + 2 + len > data.len() {
            return None;
        }
        let payload = &data[pos + 4..pos + 2 + len];
        if marker == 0xE1 && payload.starts_with(b"Exif\0\0") {
            return Some(payload);
        }
        pos += 2 + len;
    }
    None
}

fn map_err(err: jpeg_decoder::Error) -> DecodeError {
    match err {
        jpeg_decoder::Error::Format(msg) => DecodeError::CorruptFrame(msg),
        jpeg_decoder::Error::Unsupported(feature) => {
            DecodeError::UnsupportedFeature(format!("{feature:?}"))
        }
        jpeg_decoder::Error::Io(_) => DecodeError::Truncated,
        other => DecodeError::CorruptFrame(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_jpeg() {
        assert!(JpegDecoder::new(b"\x89PNG\r\n\x1a\n").is_err());
        assert!(JpegDecoder::new(&[]).is_err());
    }

    #[test]
    fn app1_walker_ignores_app0() {
        // SOI, APP0 (JFIF, 16 bytes), APP1 with EXIF magic
        let mut data = vec![0xFF, 0xD8];
        data.extend_from_slice(&[0xFF, 0xE0, 0x00, 0x04, 0x4A, 0x46]);
        data.extend_from_slice(&[0xFF, 0xE1, 0x00, 0x08, b'E', b'x', b'i', b'f', 0, 0]);
        let payload = find_app1(&data).unwrap();
        assert!(payload.starts_with(b"Exif\0\0"));
    }
}
