use std::io::Cursor;

use crate::anim::{AnimationHeader, Blend, Dispose, FrameHeader};
use crate::error::DecodeError;
use crate::exif::orientation_from_exif;
use crate::limits::Limits;
use crate::matrix::PixelMatrix;
use crate::orient::Orientation;
use crate::pixel::PixelType;

use super::riff::{self, ContainerInfo};

/// WebP decoder for stills and animations.
///
/// Frame pixels come from `image-webp` (which composites animations onto
/// the canvas); per-frame `ANMF` metadata, the `ANIM` parameters, and the
/// `ICCP`/`EXIF`/`XMP ` chunks are read from the container here.
pub struct WebpDecoder<'a> {
    inner: image_webp::WebPDecoder<Cursor<&'a [u8]>>,
    header: AnimationHeader,
    container: ContainerInfo,
    pixel: PixelType,
    orientation: Orientation,
    frame_header: FrameHeader,
    frames_read: u32,
    scratch: Vec<u8>,
}

impl<'a> WebpDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, DecodeError> {
        Self::with_limits(data, &Limits::default())
    }

    pub fn with_limits(data: &'a [u8], limits: &Limits) -> Result<Self, DecodeError> {
        let container = riff::scan(data)?;
        let mut inner = image_webp::WebPDecoder::new(Cursor::new(data)).map_err(map_err)?;

        let (width, height) = inner.dimensions();
        limits.check(width, height)?;
        if let Some(size) = inner.output_buffer_size() {
            limits.check_memory(size)?;
        }

        let pixel = if inner.has_alpha() {
            PixelType::Bgra8
        } else {
            PixelType::Bgr8
        };
        let frame_count = if inner.is_animated() {
            inner.num_frames()
        } else {
            1
        };
        let total_duration_ms = container
            .frames
            .iter()
            .fold(0u32, |acc, f| acc.saturating_add(f.duration_ms));

        let icc = inner.icc_profile().map_err(map_err)?;
        let xmp = inner.xmp_metadata().map_err(map_err)?;
        let orientation = inner
            .exif_metadata()
            .map_err(map_err)?
            .as_deref()
            .and_then(orientation_from_exif)
            .unwrap_or(Orientation::Normal);

        Ok(Self {
            header: AnimationHeader {
                canvas_width: width,
                canvas_height: height,
                frame_count,
                loop_count: container.loop_count,
                total_duration_ms,
                bg_color: container.bg_color,
                icc,
                xmp,
            },
            pixel,
            orientation,
            frame_header: FrameHeader::default(),
            frames_read: 0,
            scratch: Vec::new(),
            container,
            inner,
        })
    }

    pub fn width(&self) -> u32 {
        self.header.canvas_width
    }

    pub fn height(&self) -> u32 {
        self.header.canvas_height
    }

    /// `Bgra8` when the container signals alpha, `Bgr8` otherwise.
    pub fn pixel_type(&self) -> PixelType {
        self.pixel
    }

    pub fn is_animated(&self) -> bool {
        self.container.animated
    }

    pub fn frame_count(&self) -> u32 {
        self.header.frame_count
    }

    pub fn loop_count(&self) -> u32 {
        self.header.loop_count
    }

    /// Total animation duration in milliseconds (zero for stills).
    pub fn total_duration_ms(&self) -> u32 {
        self.header.total_duration_ms
    }

    /// Background color from the `ANIM` chunk as `0xRRGGBBAA`.
    pub fn bg_color(&self) -> u32 {
        self.header.bg_color
    }

    /// Orientation from the `EXIF` chunk, `Normal` when absent.
    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    pub fn header(&self) -> &AnimationHeader {
        &self.header
    }

    /// Copy the `ICCP` profile into `buf`; returns bytes copied.
    pub fn icc(&self, buf: &mut [u8]) -> usize {
        self.header.icc_into(buf)
    }

    /// Copy the `XMP ` chunk into `buf`; returns bytes copied.
    pub fn xmp(&self, buf: &mut [u8]) -> usize {
        self.header.xmp_into(buf)
    }

    /// Metadata of the most recently decoded frame.
    pub fn frame_header(&self) -> FrameHeader {
        self.frame_header
    }

    pub fn has_more_frames(&self) -> bool {
        self.frames_read < self.header.frame_count
    }

    /// Decode the current frame into `mat` (composed, canvas-sized) and
    /// advance the cursor.
    pub fn decode_into(&mut self, mat: &mut PixelMatrix<'_>) -> Result<(), DecodeError> {
        if !self.has_more_frames() {
            return Err(DecodeError::Eof);
        }
        if mat.pixel_type() != self.pixel {
            return Err(DecodeError::PixelTypeMismatch {
                expected: self.pixel,
                actual: mat.pixel_type(),
            });
        }
        let (cw, ch) = (self.header.canvas_width, self.header.canvas_height);
        if mat.width() < cw || mat.height() < ch {
            return Err(DecodeError::MatrixTooSmall {
                needed_width: cw,
                needed_height: ch,
                width: mat.width(),
                height: mat.height(),
            });
        }

        self.next_frame_pixels()?;

        let bpp = self.pixel.bytes_per_pixel();
        let row_len = cw as usize * bpp;
        for y in 0..ch {
            let src = &self.scratch[y as usize * row_len..(y as usize + 1) * row_len];
            let dst = &mut mat.row_mut(y)[..row_len];
            for (d, s) in dst.chunks_exact_mut(bpp).zip(src.chunks_exact(bpp)) {
                d[0] = s[2];
                d[1] = s[1];
                d[2] = s[0];
                if bpp == 4 {
                    d[3] = s[3];
                }
            }
        }
        Ok(())
    }

    /// Advance past the current frame without copying pixels out.
    pub fn skip_frame(&mut self) -> Result<(), DecodeError> {
        if !self.has_more_frames() {
            return Err(DecodeError::Eof);
        }
        self.next_frame_pixels()
    }

    /// Fill `self.scratch` with the next frame (RGB(A), canvas-sized) and
    /// update cursor and frame metadata.
    fn next_frame_pixels(&mut self) -> Result<(), DecodeError> {
        let size = self
            .inner
            .output_buffer_size()
            .ok_or_else(|| DecodeError::LimitExceeded("canvas exceeds usize".into()))?;
        self.scratch.resize(size, 0);

        let duration = if self.inner.is_animated() {
            self.inner.read_frame(&mut self.scratch).map_err(map_err)?
        } else {
            self.inner.read_image(&mut self.scratch).map_err(map_err)?;
            0
        };

        self.frame_header = match self.container.frames.get(self.frames_read as usize) {
            Some(anmf) => anmf.to_frame_header(),
            None => FrameHeader {
                duration_ms: duration,
                width: self.header.canvas_width,
                height: self.header.canvas_height,
                blend: Blend::Source,
                dispose: Dispose::None,
                ..FrameHeader::default()
            },
        };
        self.frames_read += 1;
        Ok(())
    }
}

fn map_err(err: image_webp::DecodingError) -> DecodeError {
    match err {
        image_webp::DecodingError::IoError(_) => DecodeError::Truncated,
        image_webp::DecodingError::NoMoreFrames => DecodeError::Eof,
        other => DecodeError::CorruptFrame(other.to_string()),
    }
}
