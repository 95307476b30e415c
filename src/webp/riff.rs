//! RIFF container walk and assembly for WebP.

use crate::anim::{Blend, Dispose, FrameHeader};
use crate::error::DecodeError;

pub(crate) const FLAG_ICC: u8 = 0x20;
pub(crate) const FLAG_ALPHA: u8 = 0x10;
pub(crate) const FLAG_XMP: u8 = 0x04;
pub(crate) const FLAG_ANIM: u8 = 0x02;

/// Frame metadata lifted from an `ANMF` chunk header.
#[derive(Clone, Copy, Debug)]
pub(crate) struct AnmfInfo {
    pub x_offset: u32,
    pub y_offset: u32,
    pub width: u32,
    pub height: u32,
    pub duration_ms: u32,
    pub dispose: Dispose,
    pub blend: Blend,
}

impl AnmfInfo {
    pub(crate) fn to_frame_header(self) -> FrameHeader {
        FrameHeader {
            duration_ms: self.duration_ms,
            x_offset: self.x_offset,
            y_offset: self.y_offset,
            width: self.width,
            height: self.height,
            dispose: self.dispose,
            blend: self.blend,
        }
    }
}

/// Container-level metadata gathered in one RIFF pass.
#[derive(Clone, Debug, Default)]
pub(crate) struct ContainerInfo {
    pub animated: bool,
    /// `0xRRGGBBAA`.
    pub bg_color: u32,
    pub loop_count: u32,
    pub frames: Vec<AnmfInfo>,
}

/// Walk the top-level RIFF chunks of a WebP stream.
pub(crate) fn scan(data: &[u8]) -> Result<ContainerInfo, DecodeError> {
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WEBP" {
        return Err(DecodeError::InvalidHeader("missing RIFF/WEBP header".into()));
    }
    let mut info = ContainerInfo {
        // Containers without an ANIM chunk report a white background.
        bg_color: 0xFFFF_FFFF,
        ..ContainerInfo::default()
    };

    let mut pos = 12usize;
    while pos + 8 <= data.len() {
        let fourcc: [u8; 4] = data[pos..pos + 4].try_into().expect("bounds checked");
        let len = u32::from_le_bytes(data[pos + 4..pos + 8].try_into().expect("bounds checked"))
            as usize;
        let body = data
            .get(pos + 8..pos + 8 + len)
            .ok_or(DecodeError::Truncated)?;
        match &fourcc {
            b"ANIM" if len >= 6 => {
                info.animated = true;
                // Stored blue, green, red, alpha.
                info.bg_color =
                    u32::from_be_bytes([body[2], body[1], body[0], body[3]]);
                info.loop_count = u32::from(u16::from_le_bytes([body[4], body[5]]));
            }
            b"ANMF" if len >= 16 => {
                info.animated = true;
                info.frames.push(parse_anmf(body));
            }
            _ => {}
        }
        pos += 8 + len + (len & 1);
    }
    Ok(info)
}

fn parse_anmf(body: &[u8]) -> AnmfInfo {
    let u24 = |at: usize| {
        u32::from(body[at]) | u32::from(body[at + 1]) << 8 | u32::from(body[at + 2]) << 16
    };
    let flags = body[15];
    AnmfInfo {
        x_offset: u24(0) * 2,
        y_offset: u24(3) * 2,
        width: u24(6) + 1,
        height: u24(9) + 1,
        duration_ms: u24(12),
        // Bit 1: 1 = do not blend; bit 0: 1 = dispose to background.
        blend: if flags & 0b10 == 0 {
            Blend::Over
        } else {
            Blend::Source
        },
        dispose: if flags & 0b01 != 0 {
            Dispose::Background
        } else {
            Dispose::None
        },
    }
}

/// Extract the bitstream chunks (`ALPH` and/or `VP8 `/`VP8L`) from a
/// complete still WebP produced by the lossless encoder.
///
/// Returns `(chunks, has_alpha)` where `chunks` keeps the 8-byte chunk
/// headers so the bytes can be dropped into an `ANMF` body verbatim.
pub(crate) fn extract_bitstream(data: &[u8]) -> Result<(Vec<u8>, bool), DecodeError> {
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WEBP" {
        return Err(DecodeError::InvalidHeader("encoder produced non-WebP".into()));
    }
    let mut out = Vec::new();
    let mut has_alpha = false;
    let mut pos = 12usize;
    while pos + 8 <= data.len() {
        let fourcc = &data[pos..pos + 4];
        let len = u32::from_le_bytes(data[pos + 4..pos + 8].try_into().expect("bounds checked"))
            as usize;
        let padded = len + (len & 1);
        let chunk = data
            .get(pos..pos + 8 + padded)
            .ok_or(DecodeError::Truncated)?;
        match fourcc {
            b"VP8 " | b"VP8L" | b"ALPH" => {
                if fourcc == b"ALPH" {
                    has_alpha = true;
                }
                if fourcc == b"VP8L" {
                    // VP8L declares alpha in its signature byte 4, bit 4.
                    has_alpha |= chunk.get(8 + 4).is_some_and(|b| b & 0x10 != 0);
                }
                out.extend_from_slice(chunk);
            }
            b"VP8X" => {
                has_alpha |= chunk.get(8).is_some_and(|b| b & FLAG_ALPHA != 0);
            }
            _ => {}
        }
        pos += 8 + padded;
    }
    if out.is_empty() {
        return Err(DecodeError::InvalidHeader("no bitstream chunk".into()));
    }
    Ok((out, has_alpha))
}

// ── Container assembly ───────────────────────────────────────────────

pub(crate) struct ChunkWriter {
    data: Vec<u8>,
}

impl ChunkWriter {
    pub(crate) fn new() -> Self {
        // RIFF header; the size field is patched in finish().
        let mut data = Vec::with_capacity(1024);
        data.extend_from_slice(b"RIFF\0\0\0\0WEBP");
        Self { data }
    }

    pub(crate) fn chunk(&mut self, fourcc: &[u8; 4], body: &[u8]) {
        self.data.extend_from_slice(fourcc);
        self.data
            .extend_from_slice(&(body.len() as u32).to_le_bytes());
        self.data.extend_from_slice(body);
        if body.len() & 1 == 1 {
            self.data.push(0);
        }
    }

    /// Append pre-serialized chunks (header included) verbatim.
    pub(crate) fn raw(&mut self, chunks: &[u8]) {
        self.data.extend_from_slice(chunks);
    }

    pub(crate) fn vp8x(&mut self, flags: u8, canvas_width: u32, canvas_height: u32) {
        let mut body = [0u8; 10];
        body[0] = flags;
        body[4..7].copy_from_slice(&u24_le(canvas_width - 1));
        body[7..10].copy_from_slice(&u24_le(canvas_height - 1));
        self.chunk(b"VP8X", &body);
    }

    pub(crate) fn anim(&mut self, bg_color: u32, loop_count: u32) {
        let mut body = [0u8; 6];
        // 0xRRGGBBAA stored as blue, green, red, alpha.
        let [r, g, b, a] = bg_color.to_be_bytes();
        body[0] = b;
        body[1] = g;
        body[2] = r;
        body[3] = a;
        body[4..6].copy_from_slice(&(loop_count.min(u32::from(u16::MAX)) as u16).to_le_bytes());
        self.chunk(b"ANIM", &body);
    }

    pub(crate) fn anmf(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        duration_ms: u32,
        dispose: Dispose,
        blend: Blend,
        bitstream: &[u8],
    ) {
        let mut body = Vec::with_capacity(16 + bitstream.len());
        body.extend_from_slice(&u24_le(x / 2));
        body.extend_from_slice(&u24_le(y / 2));
        body.extend_from_slice(&u24_le(width - 1));
        body.extend_from_slice(&u24_le(height - 1));
        body.extend_from_slice(&u24_le(duration_ms));
        let mut flags = 0u8;
        if blend == Blend::Source {
            flags |= 0b10;
        }
        if dispose == Dispose::Background {
            flags |= 0b01;
        }
        body.push(flags);
        body.extend_from_slice(bitstream);
        self.chunk(b"ANMF", &body);
    }

    pub(crate) fn finish(mut self) -> Vec<u8> {
        let riff_size = (self.data.len() - 8) as u32;
        self.data[4..8].copy_from_slice(&riff_size.to_le_bytes());
        self.data
    }
}

fn u24_le(value: u32) -> [u8; 3] {
    debug_assert!(value < 1 << 24);
    let b = value.to_le_bytes();
    [b[0], b[1], b[2]]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_produces_padded_riff() {
        let mut w = ChunkWriter::new();
        w.chunk(b"TEST", &[1, 2, 3]);
        let out = w.finish();
        assert_eq!(&out[0..4], b"RIFF");
        assert_eq!(&out[8..12], b"WEBP");
        // 4 (WEBP) + 8 (header) + 3 (body) + 1 (pad)
        assert_eq!(u32::from_le_bytes(out[4..8].try_into().unwrap()), 16);
        assert_eq!(out.len(), 24);
    }

    #[test]
    fn anim_round_trips_bg_color() {
        let mut w = ChunkWriter::new();
        w.vp8x(FLAG_ANIM, 10, 20);
        w.anim(0x11223344, 7);
        w.anmf(2, 4, 10, 20, 120, Dispose::Background, Blend::Over, &[]);
        let out = w.finish();
        let info = scan(&out).unwrap();
        assert!(info.animated);
        assert_eq!(info.bg_color, 0x11223344);
        assert_eq!(info.loop_count, 7);
        assert_eq!(info.frames.len(), 1);
        let f = info.frames[0];
        assert_eq!((f.x_offset, f.y_offset), (2, 4));
        assert_eq!((f.width, f.height), (10, 20));
        assert_eq!(f.duration_ms, 120);
        assert_eq!(f.dispose, Dispose::Background);
        assert_eq!(f.blend, Blend::Over);
    }
}
