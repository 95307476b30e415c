use std::io::Cursor;

use crate::anim::{AnimationHeader, Blend, Dispose, FrameHeader};
use crate::error::DecodeError;
use crate::limits::Limits;
use crate::matrix::PixelMatrix;
use crate::pixel::PixelType;

/// GIF decoder with full canvas composition.
///
/// Frames are decoded indexed, expanded through the frame's local (or the
/// global) color table to BGRA with the transparency index honored, and
/// composited onto an internal canvas per the prior frame's disposal.
pub struct GifDecoder<'a> {
    inner: gif::Decoder<Cursor<&'a [u8]>>,
    header: AnimationHeader,
    global_palette: Vec<u8>,
    /// Post-dispose canvas the next frame renders onto (BGRA).
    base: Vec<u8>,
    frame_header: FrameHeader,
    frames_read: u32,
    done: bool,
}

impl<'a> GifDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, DecodeError> {
        Self::with_limits(data, &Limits::default())
    }

    pub fn with_limits(data: &'a [u8], limits: &Limits) -> Result<Self, DecodeError> {
        let scan = scan_stream(data)?;

        let mut options = gif::DecodeOptions::new();
        options.set_color_output(gif::ColorOutput::Indexed);
        let inner = options.read_info(Cursor::new(data)).map_err(map_err)?;

        let (width, height) = (u32::from(inner.width()), u32::from(inner.height()));
        limits.check(width, height)?;
        let canvas_bytes = width as usize * height as usize * 4;
        limits.check_memory(canvas_bytes)?;

        let global_palette = inner.global_palette().map(<[u8]>::to_vec).unwrap_or_default();
        let bg_color = background_color(&global_palette, scan.bg_index);

        Ok(Self {
            header: AnimationHeader {
                canvas_width: width,
                canvas_height: height,
                frame_count: scan.frame_count,
                loop_count: scan.loop_count,
                total_duration_ms: scan.total_duration_ms,
                bg_color,
                icc: None,
                xmp: None,
            },
            global_palette,
            base: vec![0u8; canvas_bytes],
            frame_header: FrameHeader::default(),
            frames_read: 0,
            done: false,
            inner,
        })
    }

    pub fn width(&self) -> u32 {
        self.header.canvas_width
    }

    pub fn height(&self) -> u32 {
        self.header.canvas_height
    }

    /// Always `Bgra8`: palette expansion may introduce transparency.
    pub fn pixel_type(&self) -> PixelType {
        PixelType::Bgra8
    }

    pub fn frame_count(&self) -> u32 {
        self.header.frame_count
    }

    /// Loop count from the NETSCAPE2.0 extension (`0` = forever).
    pub fn loop_count(&self) -> u32 {
        self.header.loop_count
    }

    /// Background color resolved from the screen descriptor and the
    /// global color table, as `0xRRGGBBAA`.
    pub fn bg_color(&self) -> u32 {
        self.header.bg_color
    }

    pub fn header(&self) -> &AnimationHeader {
        &self.header
    }

    /// GIF carries no orientation metadata.
    pub fn orientation(&self) -> crate::Orientation {
        crate::Orientation::Normal
    }

    /// Metadata of the most recently decoded frame.
    pub fn frame_header(&self) -> FrameHeader {
        self.frame_header
    }

    pub fn has_more_frames(&self) -> bool {
        !self.done && self.frames_read < self.header.frame_count
    }

    /// Decode the next frame and write the composed canvas into `mat`.
    ///
    /// The canvas dimensions never change across frames.
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

    /// Advance past the next frame without handing out pixels.
    pub fn skip_frame(&mut self) -> Result<(), DecodeError> {
        self.next_composed().map(drop)
    }

    fn next_composed(&mut self) -> Result<Vec<u8>, DecodeError> {
        if !self.has_more_frames() {
            return Err(DecodeError::Eof);
        }
        let (cw, ch) = (self.header.canvas_width, self.header.canvas_height);

        let frame = match self.inner.read_next_frame().map_err(map_err)? {
            Some(frame) => frame,
            None => {
                self.done = true;
                return Err(DecodeError::Eof);
            }
        };

        // Clip the frame rectangle to the canvas.
        let left = u32::from(frame.left).min(cw);
        let top = u32::from(frame.top).min(ch);
        let fw = u32::from(frame.width).min(cw - left);
        let fh = u32::from(frame.height).min(ch - top);

        let palette: &[u8] = match &frame.palette {
            Some(local) => local,
            None => &self.global_palette,
        };
        if palette.is_empty() {
            return Err(DecodeError::CorruptFrame("no color table".into()));
        }

        let mut canvas = self.base.clone();
        for y in 0..fh {
            let src_row =
                &frame.buffer[(y as usize * frame.width as usize)..][..frame.width as usize];
            let dst_off = ((top + y) as usize * cw as usize + left as usize) * 4;
            let dst_row = &mut canvas[dst_off..dst_off + fw as usize * 4];
            for (x, dst) in dst_row.chunks_exact_mut(4).enumerate() {
                let index = src_row[x];
                if frame.transparent == Some(index) {
                    continue;
                }
                let p = palette.get(index as usize * 3..index as usize * 3 + 3).ok_or_else(
                    || DecodeError::CorruptFrame("palette index out of range".into()),
                )?;
                dst[0] = p[2];
                dst[1] = p[1];
                dst[2] = p[0];
                dst[3] = 255;
            }
        }

        let dispose = match frame.dispose {
            gif::DisposalMethod::Any | gif::DisposalMethod::Keep => Dispose::None,
            gif::DisposalMethod::Background => Dispose::Background,
            gif::DisposalMethod::Previous => Dispose::Previous,
        };
        match dispose {
            Dispose::None => self.base.copy_from_slice(&canvas),
            Dispose::Background => {
                // Clear the frame's region of the next base to transparent.
                self.base.copy_from_slice(&canvas);
                for y in top..top + fh {
                    let off = (y as usize * cw as usize + left as usize) * 4;
                    self.base[off..off + fw as usize * 4].fill(0);
                }
            }
            Dispose::Previous => {}
        }

        self.frame_header = FrameHeader {
            duration_ms: u32::from(frame.delay) * 10,
            x_offset: left,
            y_offset: top,
            width: fw,
            height: fh,
            dispose,
            blend: Blend::Over,
        };
        self.frames_read += 1;
        Ok(canvas)
    }
}

struct StreamScan {
    frame_count: u32,
    loop_count: u32,
    total_duration_ms: u32,
    bg_index: Option<u8>,
}

/// Walk the raw block structure once to count frames and pick up the
/// NETSCAPE2.0 loop extension, per-frame delays, and the screen
/// descriptor's background index.
fn scan_stream(data: &[u8]) -> Result<StreamScan, DecodeError> {
    if data.len() < 13 || (&data[..6] != b"GIF87a" && &data[..6] != b"GIF89a") {
        return Err(DecodeError::InvalidHeader("missing GIF signature".into()));
    }
    let packed = data[10];
    let has_gct = packed & 0x80 != 0;
    let gct_len = if has_gct {
        3 * (2usize << (packed & 0x07))
    } else {
        0
    };
    let bg_index = has_gct.then_some(data[11]);

    let mut scan = StreamScan {
        frame_count: 0,
        loop_count: 0,
        total_duration_ms: 0,
        bg_index,
    };

    let mut pos = 13 + gct_len;
    while pos < data.len() {
        match data[pos] {
            0x3B => break, // trailer
            0x21 => {
                // extension: label, then sub-blocks
                let label = *data.get(pos + 1).ok_or(DecodeError::Truncated)?;
                pos += 2;
                let mut first_block = true;
                let mut is_netscape = false;
                loop {
                    let len = *data.get(pos).ok_or(DecodeError::Truncated)? as usize;
                    if len == 0 {
                        pos += 1;
                        break;
                    }
                    let block = data
                        .get(pos + 1..pos + 1 + len)
                        .ok_or(DecodeError::Truncated)?;
                    match label {
                        0xFF if first_block => {
                            is_netscape = block == b"NETSCAPE2.0";
                        }
                        0xFF if is_netscape && len >= 3 && block[0] == 1 => {
                            scan.loop_count = u32::from(u16::from_le_bytes([block[1], block[2]]));
                        }
                        0xF9 if len >= 4 => {
                            let delay = u16::from_le_bytes([block[1], block[2]]);
                            scan.total_duration_ms =
                                scan.total_duration_ms.saturating_add(u32::from(delay) * 10);
                        }
                        _ => {}
                    }
                    first_block = false;
                    pos += 1 + len;
                }
            }
            0x2C => {
                // image descriptor
                let desc = data.get(pos + 1..pos + 10).ok_or(DecodeError::Truncated)?;
                let lct_packed = desc[8];
                let lct_len = if lct_packed & 0x80 != 0 {
                    3 * (2usize << (lct_packed & 0x07))
                } else {
                    0
                };
                scan.frame_count += 1;
                pos += 10 + lct_len;
                // LZW minimum code size byte, then data sub-blocks
                pos += 1;
                loop {
                    let len = *data.get(pos).ok_or(DecodeError::Truncated)? as usize;
                    if len == 0 {
                        pos += 1;
                        break;
                    }
                    pos += 1 + len;
                }
            }
            _ => {
                return Err(DecodeError::CorruptFrame(format!(
                    "unknown block 0x{:02X}",
                    data[pos]
                )));
            }
        }
    }
    if scan.frame_count == 0 {
        return Err(DecodeError::InvalidHeader("no image descriptors".into()));
    }
    Ok(scan)
}

fn background_color(global_palette: &[u8], bg_index: Option<u8>) -> u32 {
    match bg_index {
        Some(index) => match global_palette.get(index as usize * 3..index as usize * 3 + 3) {
            Some(p) => u32::from_be_bytes([p[0], p[1], p[2], 0xFF]),
            None => 0,
        },
        None => 0,
    }
}

fn map_err(err: gif::DecodingError) -> DecodeError {
    match err {
        gif::DecodingError::Io(_) => DecodeError::Truncated,
        other => DecodeError::CorruptFrame(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_gif() {
        assert!(GifDecoder::new(b"\xFF\xD8\xFF\xE0").is_err());
        assert!(GifDecoder::new(b"GIF89a").is_err());
    }
}
