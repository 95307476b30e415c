use crate::anim::{Dispose, FrameParams};
use crate::error::EncodeError;
use crate::matrix::PixelSlice;
use crate::pixel::PixelType;
use crate::sink::{BoundedWriter, WriteCount};

/// Animated GIF encoder over a caller-supplied output buffer.
///
/// Each frame is quantized to its own 256-color table; fully transparent
/// input pixels become the frame's transparency index.
pub struct GifEncoder<'dst> {
    inner: Option<gif::Encoder<BoundedWriter<'dst>>>,
    written: WriteCount,
    width: u16,
    height: u16,
    frames_written: u32,
}

impl<'dst> GifEncoder<'dst> {
    /// Write the screen descriptor for a `width x height` canvas into
    /// `dst` and record the loop count (`0` = loop forever).
    pub fn new(
        dst: &'dst mut [u8],
        width: u32,
        height: u32,
        loop_count: u32,
    ) -> Result<Self, EncodeError> {
        if width == 0 || height == 0 || width > u32::from(u16::MAX) || height > u32::from(u16::MAX)
        {
            return Err(EncodeError::InvalidDimensions {
                width,
                height,
                stride: 0,
            });
        }
        let (writer, written) = BoundedWriter::new(dst);
        let mut inner = gif::Encoder::new(writer, width as u16, height as u16, &[])
            .map_err(map_err)?;
        let repeat = match loop_count {
            0 => gif::Repeat::Infinite,
            n => gif::Repeat::Finite(u16::try_from(n).unwrap_or(u16::MAX)),
        };
        inner.set_repeat(repeat).map_err(map_err)?;
        Ok(Self {
            inner: Some(inner),
            written,
            width: width as u16,
            height: height as u16,
            frames_written: 0,
        })
    }

    /// Quantize and append one frame.
    ///
    /// `src` must be canvas-sized BGR or BGRA; delays are rounded down to
    /// GIF's centisecond resolution.
    pub fn write_frame(
        &mut self,
        src: PixelSlice<'_>,
        params: FrameParams,
    ) -> Result<(), EncodeError> {
        let Some(inner) = self.inner.as_mut() else {
            return Err(EncodeError::InvalidArg("encoder already finalized"));
        };
        if src.pixel_type() == PixelType::Gray8 {
            return Err(EncodeError::InvalidChannelCount(1));
        }
        if src.width() != u32::from(self.width) || src.height() != u32::from(self.height) {
            return Err(EncodeError::InvalidDimensions {
                width: src.width(),
                height: src.height(),
                stride: src.stride(),
            });
        }

        let mut rgba = bgra_to_rgba(&src);
        let mut frame =
            gif::Frame::from_rgba_speed(self.width, self.height, &mut rgba, QUANTIZE_SPEED);
        frame.delay = (params.delay_ms / 10).min(u32::from(u16::MAX)) as u16;
        frame.dispose = match params.dispose {
            Dispose::None => gif::DisposalMethod::Keep,
            Dispose::Background => gif::DisposalMethod::Background,
            Dispose::Previous => gif::DisposalMethod::Previous,
        };
        inner.write_frame(&frame).map_err(map_err)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Write the trailer and return the total bytes produced.
    pub fn flush(&mut self) -> Result<usize, EncodeError> {
        if self.inner.is_none() {
            return Err(EncodeError::InvalidArg("encoder already finalized"));
        }
        if self.frames_written == 0 {
            return Err(EncodeError::InvalidArg("flush before any frame"));
        }
        // The trailer byte is written when the encoder drops.
        drop(self.inner.take());
        Ok(self.written.get())
    }
}

/// NeuQuant speed/quality trade-off (1 = best, 30 = fastest).
const QUANTIZE_SPEED: i32 = 10;

fn bgra_to_rgba(src: &PixelSlice<'_>) -> Vec<u8> {
    let bpp = src.pixel_type().bytes_per_pixel();
    let mut out = Vec::with_capacity(src.width() as usize * src.height() as usize * 4);
    for y in 0..src.height() {
        for px in src.row(y).chunks_exact(bpp) {
            out.push(px[2]);
            out.push(px[1]);
            out.push(px[0]);
            out.push(if bpp == 4 { px[3] } else { 255 });
        }
    }
    out
}

fn map_err(err: gif::EncodingError) -> EncodeError {
    match err {
        gif::EncodingError::Io(e) if crate::sink::is_overflow(&e) => EncodeError::BufferTooSmall {
            needed: 0,
            capacity: 0,
        },
        other => EncodeError::Unknown(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::PixelMatrix;

    #[test]
    fn header_magic_and_trailer() {
        let mut buf = [0u8; 4096];
        let mut enc = GifEncoder::new(&mut buf, 4, 4, 0).unwrap();
        let mut frame = PixelMatrix::new(4, 4, PixelType::Bgr8).unwrap();
        frame.set_fill(255, 0, 0, 0);
        enc.write_frame(frame.as_slice(), FrameParams::with_delay(100))
            .unwrap();
        let n = enc.flush().unwrap();
        drop(enc);
        assert!(n > 0);
        assert_eq!(&buf[..6], b"GIF89a");
        assert_eq!(buf[n - 1], 0x3B);
    }

    #[test]
    fn flush_without_frames_is_invalid() {
        let mut buf = [0u8; 1024];
        let mut enc = GifEncoder::new(&mut buf, 4, 4, 0).unwrap();
        assert_eq!(enc.flush().unwrap_err().code(), 5);
    }
}
