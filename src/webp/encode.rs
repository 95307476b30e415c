use crate::anim::FrameParams;
use crate::error::EncodeError;
use crate::matrix::PixelSlice;
use crate::options::{self, EncodeOption, OptionKey};
use crate::pixel::PixelType;

use super::riff::{self, ChunkWriter, FLAG_ALPHA, FLAG_ANIM, FLAG_ICC, FLAG_XMP};

/// Encoder container mode.
///
/// The first frame is held as a still; a second `write` upgrades the
/// container to an animation, replaying the stored first frame with its
/// original parameters.
#[derive(Debug, PartialEq, Eq)]
enum Mode {
    Empty,
    SingleStill,
    Animation,
    Finalized,
}

struct StoredFrame {
    /// Bitstream chunks with headers, ready for an `ANMF` body.
    bitstream: Vec<u8>,
    has_alpha: bool,
    width: u32,
    height: u32,
    params: FrameParams,
}

/// WebP encoder over a caller-supplied output buffer.
///
/// Frames are encoded as VP8L; `WebpQuality` is accepted for call
/// compatibility (values above 100 request lossless, which is also what
/// lower values currently produce).
pub struct WebpEncoder<'dst> {
    dst: &'dst mut [u8],
    icc: Option<Vec<u8>>,
    xmp: Option<Vec<u8>>,
    bg_color: u32,
    loop_count: u32,
    frames: Vec<StoredFrame>,
    mode: Mode,
}

impl<'dst> WebpEncoder<'dst> {
    /// Record the output buffer, optional ICC profile, the animation
    /// background color (`0xRRGGBBAA`) and loop count (`0` = forever).
    pub fn new(
        dst: &'dst mut [u8],
        icc: Option<&[u8]>,
        bg_color: u32,
        loop_count: u32,
    ) -> Self {
        Self {
            dst,
            icc: icc.filter(|p| !p.is_empty()).map(<[u8]>::to_vec),
            xmp: None,
            bg_color,
            loop_count,
            frames: Vec::new(),
            mode: Mode::Empty,
        }
    }

    /// Attach XMP metadata, written as an `XMP ` chunk on flush.
    pub fn set_xmp(&mut self, xmp: &[u8]) {
        self.xmp = (!xmp.is_empty()).then(|| xmp.to_vec());
    }

    /// Encode one frame. The first call stages a still image; any further
    /// call upgrades the container to an animation.
    pub fn write(
        &mut self,
        src: PixelSlice<'_>,
        opts: &[EncodeOption],
        params: FrameParams,
    ) -> Result<(), EncodeError> {
        if self.mode == Mode::Finalized {
            return Err(EncodeError::InvalidArg("encoder already finalized"));
        }
        if src.width() == 0 || src.height() == 0 {
            return Err(EncodeError::InvalidDimensions {
                width: src.width(),
                height: src.height(),
                stride: src.stride(),
            });
        }
        // Parsed for range validation; the lossless encoder takes over.
        let _quality = options::lookup_clamped(opts, OptionKey::WebpQuality, 0, 101, 100);

        let (data, color) = match src.pixel_type() {
            // 1-channel input is promoted to BGR first.
            PixelType::Gray8 => (gray_to_rgb(&src), image_webp::ColorType::Rgb8),
            PixelType::Bgr8 => (bgr_to_rgb(&src, 3), image_webp::ColorType::Rgb8),
            PixelType::Bgra8 => (bgr_to_rgb(&src, 4), image_webp::ColorType::Rgba8),
        };

        let mut still = Vec::new();
        image_webp::WebPEncoder::new(&mut still)
            .encode(&data, src.width(), src.height(), color)
            .map_err(|e| EncodeError::Unknown(e.to_string()))?;
        let (bitstream, has_alpha) = riff::extract_bitstream(&still)
            .map_err(|e| EncodeError::Unknown(e.to_string()))?;

        self.frames.push(StoredFrame {
            bitstream,
            has_alpha,
            width: src.width(),
            height: src.height(),
            params,
        });
        self.mode = match self.mode {
            Mode::Empty => Mode::SingleStill,
            Mode::SingleStill | Mode::Animation => Mode::Animation,
            Mode::Finalized => unreachable!(),
        };
        Ok(())
    }

    /// Assemble the container into the output buffer and return its size.
    /// The encoder is drained and rejects further use.
    pub fn flush(&mut self) -> Result<usize, EncodeError> {
        match self.mode {
            Mode::Empty => return Err(EncodeError::InvalidArg("flush before any frame")),
            Mode::Finalized => return Err(EncodeError::InvalidArg("encoder already finalized")),
            Mode::SingleStill | Mode::Animation => {}
        }

        let any_alpha = self.frames.iter().any(|f| f.has_alpha);
        let mut flags = 0u8;
        if any_alpha {
            flags |= FLAG_ALPHA;
        }
        if self.icc.is_some() {
            flags |= FLAG_ICC;
        }
        if self.xmp.is_some() {
            flags |= FLAG_XMP;
        }

        let out = if self.mode == Mode::SingleStill {
            let frame = &self.frames[0];
            if flags == 0 {
                // A bare still needs no extended header.
                let mut w = ChunkWriter::new();
                w.raw(&frame.bitstream);
                w.finish()
            } else {
                let mut w = ChunkWriter::new();
                w.vp8x(flags, frame.width, frame.height);
                if let Some(icc) = &self.icc {
                    w.chunk(b"ICCP", icc);
                }
                w.raw(&frame.bitstream);
                if let Some(xmp) = &self.xmp {
                    w.chunk(b"XMP ", xmp);
                }
                w.finish()
            }
        } else {
            // Canvas spans every frame rectangle.
            let canvas_w = self
                .frames
                .iter()
                .map(|f| f.params.x_offset + f.width)
                .max()
                .expect("frames is non-empty");
            let canvas_h = self
                .frames
                .iter()
                .map(|f| f.params.y_offset + f.height)
                .max()
                .expect("frames is non-empty");
            let mut w = ChunkWriter::new();
            w.vp8x(flags | FLAG_ANIM, canvas_w, canvas_h);
            if let Some(icc) = &self.icc {
                w.chunk(b"ICCP", icc);
            }
            w.anim(self.bg_color, self.loop_count);
            for frame in &self.frames {
                w.anmf(
                    frame.params.x_offset,
                    frame.params.y_offset,
                    frame.width,
                    frame.height,
                    frame.params.delay_ms,
                    frame.params.dispose,
                    frame.params.blend,
                    &frame.bitstream,
                );
            }
            if let Some(xmp) = &self.xmp {
                w.chunk(b"XMP ", xmp);
            }
            w.finish()
        };

        if out.len() > self.dst.len() {
            return Err(EncodeError::BufferTooSmall {
                needed: out.len(),
                capacity: self.dst.len(),
            });
        }
        self.dst[..out.len()].copy_from_slice(&out);
        self.mode = Mode::Finalized;
        self.frames.clear();
        Ok(out.len())
    }
}

fn bgr_to_rgb(src: &PixelSlice<'_>, bpp: usize) -> Vec<u8> {
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

fn gray_to_rgb(src: &PixelSlice<'_>) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.width() as usize * src.height() as usize * 3);
    for y in 0..src.height() {
        for &g in src.row(y) {
            out.extend_from_slice(&[g, g, g]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::PixelMatrix;

    #[test]
    fn single_write_yields_still_container() {
        let mut frame = PixelMatrix::new(8, 8, PixelType::Bgr8).unwrap();
        frame.set_fill(10, 20, 30, 0);
        let mut buf = vec![0u8; 16 << 10];
        let mut enc = WebpEncoder::new(&mut buf, None, 0xFFFF_FFFF, 0);
        enc.write(frame.as_slice(), &[], FrameParams::with_delay(0))
            .unwrap();
        let n = enc.flush().unwrap();
        assert_eq!(&buf[0..4], b"RIFF");
        assert_eq!(&buf[8..12], b"WEBP");
        let info = riff::scan(&buf[..n]).unwrap();
        assert!(!info.animated);
    }

    #[test]
    fn flush_on_empty_encoder_is_invalid() {
        let mut buf = vec![0u8; 1024];
        let mut enc = WebpEncoder::new(&mut buf, None, 0, 0);
        assert_eq!(enc.flush().unwrap_err().code(), 5);
    }

    #[test]
    fn second_write_upgrades_to_animation() {
        let mut frame = PixelMatrix::new(4, 4, PixelType::Bgr8).unwrap();
        frame.set_fill(1, 2, 3, 0);
        let mut buf = vec![0u8; 32 << 10];
        let mut enc = WebpEncoder::new(&mut buf, None, 0xFFFF_FFFF, 3);
        enc.write(frame.as_slice(), &[], FrameParams::with_delay(100))
            .unwrap();
        frame.set_fill(3, 2, 1, 0);
        enc.write(frame.as_slice(), &[], FrameParams::with_delay(200))
            .unwrap();
        let n = enc.flush().unwrap();
        let info = riff::scan(&buf[..n]).unwrap();
        assert!(info.animated);
        assert_eq!(info.loop_count, 3);
        assert_eq!(info.frames.len(), 2);
        assert_eq!(info.frames[0].duration_ms, 100);
        assert_eq!(info.frames[1].duration_ms, 200);
    }
}
