use std::io::Cursor;

use crate::anim::{AnimationHeader, Blend, Dispose, FrameHeader};
use crate::compose::{blend_over, blend_source};
use crate::error::DecodeError;
use crate::limits::Limits;
use crate::matrix::{PixelMatrix, PixelSlice};
use crate::pixel::PixelType;

/// PNG decoder with APNG animation support.
///
/// All color types are normalized to 8-bit BGRA. For animations the
/// decoder performs the full `fcTL` composition (dispose + blend) and
/// exposes the composed canvas per frame; a default image without an
/// `fcTL` is treated as a thumbnail outside the animation.
pub struct PngDecoder<'a> {
    reader: png::Reader<Cursor<&'a [u8]>>,
    header: AnimationHeader,
    animated: bool,
    /// Post-dispose canvas the next frame composites onto (BGRA).
    base: Vec<u8>,
    /// Canvas before the pending `Previous` dispose target was rendered.
    frame_header: FrameHeader,
    frames_read: u32,
    thumbnail_pending: bool,
    scratch: Vec<u8>,
}

impl<'a> PngDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, DecodeError> {
        Self::with_limits(data, &Limits::default())
    }

    pub fn with_limits(data: &'a [u8], limits: &Limits) -> Result<Self, DecodeError> {
        let max_bytes = limits
            .max_memory_bytes
            .map_or(usize::MAX, |b| usize::try_from(b).unwrap_or(usize::MAX));
        let mut decoder =
            png::Decoder::new_with_limits(Cursor::new(data), png::Limits { bytes: max_bytes });
        decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
        let reader = decoder.read_info().map_err(map_err)?;

        let info = reader.info();
        limits.check(info.width, info.height)?;
        let (width, height) = (info.width, info.height);

        let animated = info.animation_control.is_some();
        let (frame_count, loop_count) = match info.animation_control() {
            Some(actl) => (actl.num_frames, actl.num_plays),
            None => (1, 0),
        };
        // An IDAT without fcTL is a thumbnail, not an animation frame.
        let thumbnail_pending = animated && info.frame_control.is_none();
        let icc = info.icc_profile.as_ref().map(|c| c.to_vec());

        let canvas_bytes = width as usize * height as usize * 4;
        limits.check_memory(canvas_bytes)?;

        Ok(Self {
            header: AnimationHeader {
                canvas_width: width,
                canvas_height: height,
                frame_count,
                loop_count,
                total_duration_ms: 0,
                bg_color: 0,
                icc,
                xmp: None,
            },
            animated,
            base: vec![0u8; canvas_bytes],
            frame_header: FrameHeader::default(),
            frames_read: 0,
            thumbnail_pending,
            scratch: Vec::new(),
            reader,
        })
    }

    pub fn width(&self) -> u32 {
        self.header.canvas_width
    }

    pub fn height(&self) -> u32 {
        self.header.canvas_height
    }

    /// Always `Bgra8`; palette and grayscale are expanded.
    pub fn pixel_type(&self) -> PixelType {
        PixelType::Bgra8
    }

    /// Whether the stream carries an `acTL` animation control chunk.
    pub fn is_animated(&self) -> bool {
        self.animated
    }

    pub fn frame_count(&self) -> u32 {
        self.header.frame_count
    }

    pub fn header(&self) -> &AnimationHeader {
        &self.header
    }

    /// Copy the `iCCP` profile into `buf`; returns bytes copied.
    pub fn icc(&self, buf: &mut [u8]) -> usize {
        self.header.icc_into(buf)
    }

    /// PNG carries no orientation metadata this decoder reads.
    pub fn orientation(&self) -> crate::Orientation {
        crate::Orientation::Normal
    }

    /// Metadata of the most recently decoded frame.
    pub fn frame_header(&self) -> FrameHeader {
        self.frame_header
    }

    pub fn has_more_frames(&self) -> bool {
        self.frames_read < self.header.frame_count
    }

    /// Decode the next frame and write the composed canvas into `mat`.
    ///
    /// `mat` must be `Bgra8` and at least canvas-sized; the exposed
    /// dimensions are always the canvas dimensions, never the sub-image's.
    pub fn decode_into(&mut self, mat: &mut PixelMatrix<'_>) -> Result<(), DecodeError> {
        if mat.pixel_type() != PixelType::Bgra8 {
            return Err(DecodeError::PixelTypeMismatch {
                expected: PixelType::Bgra8,
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
        let canvas = self.next_composed()?;
        for y in 0..ch {
            let row = &canvas[y as usize * cw as usize * 4..(y as usize + 1) * cw as usize * 4];
            mat.row_mut(y)[..cw as usize * 4].copy_from_slice(row);
        }
        Ok(())
    }

    /// Advance the cursor without handing out pixels.
    ///
    /// Composition state still advances so later frames render correctly.
    pub fn skip_frame(&mut self) -> Result<(), DecodeError> {
        self.next_composed().map(drop)
    }

    /// Compose the next frame onto the canvas and return it (canvas-sized
    /// BGRA), updating the post-dispose base for the following frame.
    fn next_composed(&mut self) -> Result<Vec<u8>, DecodeError> {
        if !self.has_more_frames() {
            return Err(DecodeError::Eof);
        }
        if self.thumbnail_pending {
            self.read_raw_frame()?;
            self.thumbnail_pending = false;
        }

        let sub = self.read_raw_frame()?;

        let (cw, ch) = (self.header.canvas_width, self.header.canvas_height);
        let (fw, fh, fx, fy, blend, dispose, duration_ms);
        match self.reader.info().frame_control() {
            Some(fc) => {
                fw = fc.width;
                fh = fc.height;
                fx = fc.x_offset;
                fy = fc.y_offset;
                blend = match fc.blend_op {
                    png::BlendOp::Source => Blend::Source,
                    png::BlendOp::Over => Blend::Over,
                };
                dispose = match fc.dispose_op {
                    png::DisposeOp::None => Dispose::None,
                    png::DisposeOp::Background => Dispose::Background,
                    png::DisposeOp::Previous => Dispose::Previous,
                };
                let den = if fc.delay_den == 0 { 100 } else { fc.delay_den };
                duration_ms = u32::from(fc.delay_num) * 1000 / u32::from(den);
            }
            None => {
                // Plain still: the IDAT covers the whole canvas.
                fw = cw;
                fh = ch;
                fx = 0;
                fy = 0;
                blend = Blend::Source;
                dispose = Dispose::None;
                duration_ms = 0;
            }
        }
        if fx.checked_add(fw).is_none_or(|x| x > cw) || fy.checked_add(fh).is_none_or(|y| y > ch) {
            return Err(DecodeError::CorruptFrame(
                "frame rectangle exceeds canvas".into(),
            ));
        }

        let mut canvas = self.base.clone();
        {
            let mut canvas_slice =
                PixelMatrix::from_buf(cw, ch, PixelType::Bgra8, &mut canvas).expect("canvas sized");
            let sub_slice = PixelSlice::new(&sub, fw, fh, fw as usize * 4, PixelType::Bgra8)
                .map_err(|_| DecodeError::CorruptFrame("short frame data".into()))?;
            match blend {
                Blend::Source => blend_source(&mut canvas_slice.as_slice_mut(), &sub_slice, fx, fy),
                Blend::Over => blend_over(&mut canvas_slice.as_slice_mut(), &sub_slice, fx, fy),
            }
        }

        match dispose {
            Dispose::None => self.base.copy_from_slice(&canvas),
            Dispose::Background => self.base.fill(0),
            Dispose::Previous => {}
        }

        self.frame_header = FrameHeader {
            duration_ms,
            x_offset: fx,
            y_offset: fy,
            width: fw,
            height: fh,
            dispose,
            blend,
        };
        self.frames_read += 1;
        Ok(canvas)
    }

    /// Read the next raw (sub-image) frame and normalize it to BGRA.
    fn read_raw_frame(&mut self) -> Result<Vec<u8>, DecodeError> {
        let size = self.reader.output_buffer_size();
        self.scratch.resize(size, 0);
        let out = self
            .reader
            .next_frame(&mut self.scratch)
            .map_err(map_err)?;
        let (color, _) = self.reader.output_color_type();
        let raw = &self.scratch[..out.buffer_size()];

        let pixels = out.width as usize * out.height as usize;
        let mut bgra = vec![0u8; pixels * 4];
        match color {
            png::ColorType::Grayscale => {
                for (d, s) in bgra.chunks_exact_mut(4).zip(raw.iter()) {
                    d[0] = *s;
                    d[1] = *s;
                    d[2] = *s;
                    d[3] = 255;
                }
            }
            png::ColorType::GrayscaleAlpha => {
                for (d, s) in bgra.chunks_exact_mut(4).zip(raw.chunks_exact(2)) {
                    d[0] = s[0];
                    d[1] = s[0];
                    d[2] = s[0];
                    d[3] = s[1];
                }
            }
            png::ColorType::Rgb => {
                for (d, s) in bgra.chunks_exact_mut(4).zip(raw.chunks_exact(3)) {
                    d[0] = s[2];
                    d[1] = s[1];
                    d[2] = s[0];
                    d[3] = 255;
                }
            }
            png::ColorType::Rgba => {
                for (d, s) in bgra.chunks_exact_mut(4).zip(raw.chunks_exact(4)) {
                    d[0] = s[2];
                    d[1] = s[1];
                    d[2] = s[0];
                    d[3] = s[3];
                }
            }
            png::ColorType::Indexed => {
                // EXPAND converts indexed to RGB(A) before we see it.
                return Err(DecodeError::CorruptFrame(
                    "indexed output after expansion".into(),
                ));
            }
        }
        Ok(bgra)
    }
}

fn map_err(err: png::DecodingError) -> DecodeError {
    match err {
        png::DecodingError::IoError(_) => DecodeError::Truncated,
        png::DecodingError::Format(e) => DecodeError::CorruptFrame(e.to_string()),
        png::DecodingError::Parameter(e) => DecodeError::CorruptFrame(e.to_string()),
        png::DecodingError::LimitsExceeded => {
            DecodeError::LimitExceeded("png memory limit".into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_png() {
        assert!(PngDecoder::new(b"GIF89a").is_err());
    }
}
