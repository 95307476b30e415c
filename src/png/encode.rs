use crate::anim::{Blend, Dispose, FrameHeader};
use crate::error::EncodeError;
use crate::matrix::PixelSlice;
use crate::options::{self, EncodeOption, OptionKey};
use crate::pixel::PixelType;
use crate::sink::{BoundedWriter, WriteCount, is_overflow};

use super::DEFAULT_COMPRESSION;

fn map_err(err: png::EncodingError) -> EncodeError {
    match err {
        png::EncodingError::IoError(e) if is_overflow(&e) => {
            // Capacity is unknowable mid-stream; report what we had.
            EncodeError::BufferTooSmall {
                needed: 0,
                capacity: 0,
            }
        }
        png::EncodingError::IoError(e) => EncodeError::Unknown(e.to_string()),
        png::EncodingError::Parameter(e) => EncodeError::Unknown(e.to_string()),
        other => EncodeError::Unknown(other.to_string()),
    }
}

fn compression_level(opts: &[EncodeOption]) -> png::Compression {
    let level = options::lookup_clamped(opts, OptionKey::Compression, 0, 9, DEFAULT_COMPRESSION);
    match level {
        0..=2 => png::Compression::Fast,
        3..=7 => png::Compression::Default,
        _ => png::Compression::Best,
    }
}

/// `iCCP` chunk body: profile name, deflate method, zlib-compressed data.
fn iccp_chunk_body(icc: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(icc.len() / 2 + 16);
    body.extend_from_slice(b"ICC Profile\0");
    body.push(0); // compression method: deflate
    body.extend(miniz_oxide::deflate::compress_to_vec_zlib(icc, 7));
    body
}

/// Swizzle a BGR(A) slice into the RGB(A) bytes PNG stores.
fn to_rgb_bytes(src: &PixelSlice<'_>) -> Vec<u8> {
    let bpp = src.pixel_type().bytes_per_pixel();
    let mut out = Vec::with_capacity(src.width() as usize * src.height() as usize * bpp);
    for y in 0..src.height() {
        for px in src.row(y).chunks_exact(bpp) {
            out.push(px[2]);
            out.push(px[1]);
            out.push(px[0]);
            if bpp == 4 {
                out.push(px[3]);
            }
        }
    }
    out
}

/// Still PNG encoder over a caller-supplied output buffer.
pub struct PngEncoder<'dst> {
    dst: &'dst mut [u8],
    icc: Option<Vec<u8>>,
}

impl<'dst> PngEncoder<'dst> {
    /// Record the output buffer and an optional ICC profile to embed as an
    /// `iCCP` chunk ahead of the image data.
    pub fn new(dst: &'dst mut [u8], icc: Option<&[u8]>) -> Self {
        Self {
            dst,
            icc: icc.filter(|p| !p.is_empty()).map(<[u8]>::to_vec),
        }
    }

    /// Compress `src` into the output buffer and return the byte count.
    ///
    /// Recognized option: `Compression` (0-9, default 6). 3-channel input
    /// writes RGB, 4-channel writes RGBA.
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
        let color = match src.pixel_type() {
            PixelType::Bgr8 => png::ColorType::Rgb,
            PixelType::Bgra8 => png::ColorType::Rgba,
            PixelType::Gray8 => return Err(EncodeError::InvalidChannelCount(1)),
        };

        let capacity = self.dst.len();
        let icc_body = self.icc.as_deref().map(iccp_chunk_body);
        let (writer, written) = BoundedWriter::new(self.dst);
        let mut encoder = png::Encoder::new(writer, src.width(), src.height());
        encoder.set_color(color);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(compression_level(opts));

        let mut w = encoder
            .write_header()
            .map_err(|e| capacity_err(e, capacity))?;
        if let Some(body) = icc_body {
            w.write_chunk(png::chunk::iCCP, &body)
                .map_err(|e| capacity_err(e, capacity))?;
        }
        w.write_image_data(&to_rgb_bytes(&src))
            .map_err(|e| capacity_err(e, capacity))?;
        w.finish().map_err(|e| capacity_err(e, capacity))?;
        Ok(written.get())
    }
}

/// Attach the known buffer capacity to overflow failures.
fn capacity_err(err: png::EncodingError, capacity: usize) -> EncodeError {
    match map_err(err) {
        EncodeError::BufferTooSmall { .. } => EncodeError::BufferTooSmall {
            needed: capacity + 1,
            capacity,
        },
        other => other,
    }
}

/// APNG encoder: sequential frames against a fixed canvas, emitting only
/// the minimal differing rectangle of each frame.
///
/// Pixels identical to the previous frame are written fully transparent,
/// differing pixels fully opaque, with `dispose=None` / `blend=Over`.
pub struct ApngEncoder<'dst> {
    writer: Option<png::Writer<BoundedWriter<'dst>>>,
    written: WriteCount,
    capacity: usize,
    width: u32,
    height: u32,
    declared_frames: u32,
    frames_written: u32,
    /// Previous canvas, BGRA, minimal stride.
    prev: Vec<u8>,
}

impl std::fmt::Debug for ApngEncoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApngEncoder")
            .field("capacity", &self.capacity)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("declared_frames", &self.declared_frames)
            .field("frames_written", &self.frames_written)
            .finish()
    }
}

impl<'dst> ApngEncoder<'dst> {
    /// Start an animation of exactly `num_frames` frames on a
    /// `width x height` canvas, writing into `dst`.
    pub fn new(
        dst: &'dst mut [u8],
        width: u32,
        height: u32,
        num_frames: u32,
    ) -> Result<Self, EncodeError> {
        if width == 0 || height == 0 {
            return Err(EncodeError::InvalidDimensions {
                width,
                height,
                stride: 0,
            });
        }
        if num_frames == 0 {
            return Err(EncodeError::InvalidArg("an animation needs frames"));
        }
        let capacity = dst.len();
        let (writer, written) = BoundedWriter::new(dst);
        let mut encoder = png::Encoder::new(writer, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder
            .set_animated(num_frames, 0)
            .map_err(map_err)?;
        let writer = encoder.write_header().map_err(map_err)?;
        Ok(Self {
            writer: Some(writer),
            written,
            capacity,
            width,
            height,
            declared_frames: num_frames,
            frames_written: 0,
            prev: vec![0u8; width as usize * height as usize * 4],
        })
    }

    /// Append one frame. `src` must be a BGRA canvas-sized image.
    pub fn encode_frame(
        &mut self,
        src: PixelSlice<'_>,
        delay_ms: u32,
    ) -> Result<(), EncodeError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(EncodeError::InvalidArg("encoder already finalized"));
        };
        if src.pixel_type() != PixelType::Bgra8 {
            return Err(EncodeError::InvalidChannelCount(
                src.pixel_type().channels(),
            ));
        }
        if src.width() != self.width || src.height() != self.height {
            return Err(EncodeError::InvalidDimensions {
                width: src.width(),
                height: src.height(),
                stride: src.stride(),
            });
        }
        if self.frames_written >= self.declared_frames {
            return Err(EncodeError::InvalidArg("more frames than declared"));
        }

        let delay = u16::try_from(delay_ms).unwrap_or(u16::MAX);
        writer.set_frame_delay(delay, 1000).map_err(map_err)?;
        writer
            .set_dispose_op(png::DisposeOp::None)
            .map_err(map_err)?;

        let capacity = self.capacity;
        if self.frames_written == 0 {
            // The first frame doubles as the default image and must cover
            // the whole canvas.
            writer.set_blend_op(png::BlendOp::Source).map_err(map_err)?;
            let rgba = to_rgb_bytes(&src);
            writer
                .write_image_data(&rgba)
                .map_err(|e| capacity_err(e, capacity))?;
        } else {
            let (x0, y0, w, h) = diff_bounds(&src, &self.prev, self.width, self.height);
            let rect = diff_rect(&src, &self.prev, x0, y0, w, h);
            let writer = self.writer.as_mut().expect("checked above");
            writer.set_blend_op(png::BlendOp::Over).map_err(map_err)?;
            writer.set_frame_dimension(w, h).map_err(map_err)?;
            writer.set_frame_position(x0, y0).map_err(map_err)?;
            writer
                .write_image_data(&rect)
                .map_err(|e| capacity_err(e, capacity))?;
        }

        // Snapshot the full frame for the next diff.
        for y in 0..self.height {
            let row = src.row(y);
            let off = y as usize * self.width as usize * 4;
            self.prev[off..off + row.len()].copy_from_slice(row);
        }
        self.frames_written += 1;
        Ok(())
    }

    /// Frame parameters this encoder emits for every non-initial frame.
    pub fn frame_params(&self) -> FrameHeader {
        FrameHeader {
            dispose: Dispose::None,
            blend: Blend::Over,
            ..FrameHeader::default()
        }
    }

    /// Close the stream and return the total bytes written.
    pub fn flush(&mut self) -> Result<usize, EncodeError> {
        let Some(writer) = self.writer.take() else {
            return Err(EncodeError::InvalidArg("encoder already finalized"));
        };
        if self.frames_written == 0 {
            return Err(EncodeError::InvalidArg("flush before any frame"));
        }
        writer
            .finish()
            .map_err(|e| capacity_err(e, self.capacity))?;
        Ok(self.written.get())
    }
}

/// Smallest rectangle of pixels differing from the previous canvas:
/// identical rows are trimmed top and bottom, then identical columns are
/// trimmed within the remaining row band.
fn diff_bounds(src: &PixelSlice<'_>, prev: &[u8], width: u32, height: u32) -> (u32, u32, u32, u32) {
    let w = width as usize;
    let prev_row = |y: u32| &prev[y as usize * w * 4..(y as usize + 1) * w * 4];

    let mut y0 = None;
    for y in 0..height {
        if src.row(y) != prev_row(y) {
            y0 = Some(y);
            break;
        }
    }
    // Identical frames still emit one (transparent) pixel.
    let Some(y0) = y0 else {
        return (0, 0, 1, 1);
    };
    let mut y1 = y0;
    for y in (y0..height).rev() {
        if src.row(y) != prev_row(y) {
            y1 = y;
            break;
        }
    }

    let differs_col = |x: u32| {
        (y0..=y1).any(|y| {
            let a = &src.row(y)[x as usize * 4..x as usize * 4 + 4];
            let b = &prev_row(y)[x as usize * 4..x as usize * 4 + 4];
            a != b
        })
    };
    let mut x0 = 0;
    for x in 0..width {
        if differs_col(x) {
            x0 = x;
            break;
        }
    }
    let mut x1 = x0;
    for x in (x0..width).rev() {
        if differs_col(x) {
            x1 = x;
            break;
        }
    }
    (x0, y0, x1 - x0 + 1, y1 - y0 + 1)
}

/// RGBA rectangle with matching pixels transparent and differing pixels
/// opaque.
fn diff_rect(src: &PixelSlice<'_>, prev: &[u8], x0: u32, y0: u32, w: u32, h: u32) -> Vec<u8> {
    let width = src.width() as usize;
    let mut out = Vec::with_capacity(w as usize * h as usize * 4);
    for y in y0..y0 + h {
        let srow = src.row(y);
        let prow = &prev[y as usize * width * 4..(y as usize + 1) * width * 4];
        for x in x0..x0 + w {
            let s = &srow[x as usize * 4..x as usize * 4 + 4];
            let p = &prow[x as usize * 4..x as usize * 4 + 4];
            if s == p {
                out.extend_from_slice(&[0, 0, 0, 0]);
            } else {
                out.extend_from_slice(&[s[2], s[1], s[0], 255]);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::PixelMatrix;

    #[test]
    fn diff_bounds_finds_single_pixel() {
        let mut a = PixelMatrix::new(10, 10, PixelType::Bgra8).unwrap();
        a.set_fill(255, 0, 0, 255);
        let prev = a.bytes().to_vec();
        // Identical frames collapse to a placeholder pixel.
        assert_eq!(diff_bounds(&a.as_slice(), &prev, 10, 10), (0, 0, 1, 1));
        // Now make (5,5) blue.
        a.row_mut(5)[5 * 4..5 * 4 + 4].copy_from_slice(&[255, 0, 0, 255]);
        assert_eq!(diff_bounds(&a.as_slice(), &prev, 10, 10), (5, 5, 1, 1));
    }

    #[test]
    fn zero_frames_is_invalid() {
        let mut buf = [0u8; 1024];
        let err = ApngEncoder::new(&mut buf, 4, 4, 0).unwrap_err();
        assert_eq!(err.code(), 5);
    }
}
