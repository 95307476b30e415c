use ravif::Img;
use rgb::{RGB8, RGBA8};

use crate::anim::{Blend, FrameParams};
use crate::error::EncodeError;
use crate::matrix::PixelSlice;
use crate::options::{self, EncodeOption, OptionKey};
use crate::pixel::PixelType;

use super::boxes;
use super::mux::{self, ColorDescription, ItemPayload, TrackPayload};

const DEFAULT_QUALITY: i64 = 60;
const DEFAULT_SPEED: i64 = 6;
/// Milliseconds; one tick of the container timescale.
const TIMESCALE: u32 = 1000;

struct EncodedFrame {
    color_obus: Vec<u8>,
    alpha_obus: Option<Vec<u8>>,
    av1c: Vec<u8>,
    alpha_av1c: Option<Vec<u8>>,
    nclx: Option<boxes::Nclx>,
    width: u32,
    height: u32,
    duration_ms: u32,
}

/// AVIF encoder over a caller-supplied output buffer.
///
/// One frame produces a still `avif` item; multiple frames produce an
/// `avis` sequence with a millisecond timescale. ICC and XMP are carried
/// into the container; 4-channel input adds an auxiliary alpha
/// item/track.
pub struct AvifEncoder<'dst> {
    dst: &'dst mut [u8],
    icc: Option<Vec<u8>>,
    xmp: Option<Vec<u8>>,
    frames: Vec<EncodedFrame>,
    finalized: bool,
}

impl<'dst> AvifEncoder<'dst> {
    /// Record the output buffer plus optional ICC profile and XMP color
    /// metadata to embed.
    pub fn new(dst: &'dst mut [u8], icc: Option<&[u8]>, xmp: Option<&[u8]>) -> Self {
        Self {
            dst,
            icc: icc.filter(|p| !p.is_empty()).map(<[u8]>::to_vec),
            xmp: xmp.filter(|x| !x.is_empty()).map(<[u8]>::to_vec),
            frames: Vec::new(),
            finalized: false,
        }
    }

    /// Encode one frame.
    ///
    /// Recognized options: `AvifQuality` (0-100, default 60) and
    /// `AvifSpeed` (0-10, default 6). The frame duration comes from
    /// `params.delay_ms`, floored to one timescale tick.
    pub fn write(
        &mut self,
        src: PixelSlice<'_>,
        opts: &[EncodeOption],
        params: FrameParams,
    ) -> Result<(), EncodeError> {
        if self.finalized {
            return Err(EncodeError::InvalidArg("encoder already finalized"));
        }
        if src.width() == 0 || src.height() == 0 {
            return Err(EncodeError::InvalidDimensions {
                width: src.width(),
                height: src.height(),
                stride: src.stride(),
            });
        }
        if let Some(first) = self.frames.first() {
            if first.width != src.width() || first.height != src.height() {
                return Err(EncodeError::InvalidDimensions {
                    width: src.width(),
                    height: src.height(),
                    stride: src.stride(),
                });
            }
        }

        let quality =
            options::lookup_clamped(opts, OptionKey::AvifQuality, 0, 100, DEFAULT_QUALITY) as f32;
        let speed =
            options::lookup_clamped(opts, OptionKey::AvifSpeed, 0, 10, DEFAULT_SPEED) as u8;

        let encoder = ravif::Encoder::new()
            .with_quality(quality)
            .with_alpha_quality(quality)
            .with_speed(speed);

        let (w, h) = (src.width() as usize, src.height() as usize);
        let encoded = match src.pixel_type() {
            PixelType::Bgra8 => {
                let mut pixels = Vec::with_capacity(w * h);
                for y in 0..src.height() {
                    for px in src.row(y).chunks_exact(4) {
                        pixels.push(RGBA8::new(px[2], px[1], px[0], px[3]));
                    }
                }
                encoder.encode_rgba(Img::new(&pixels[..], w, h))
            }
            PixelType::Bgr8 => {
                let mut pixels = Vec::with_capacity(w * h);
                for y in 0..src.height() {
                    for px in src.row(y).chunks_exact(3) {
                        pixels.push(RGB8::new(px[2], px[1], px[0]));
                    }
                }
                encoder.encode_rgb(Img::new(&pixels[..], w, h))
            }
            PixelType::Gray8 => {
                let mut pixels = Vec::with_capacity(w * h);
                for y in 0..src.height() {
                    for &g in src.row(y) {
                        pixels.push(RGB8::new(g, g, g));
                    }
                }
                encoder.encode_rgb(Img::new(&pixels[..], w, h))
            }
        }
        .map_err(|e| EncodeError::Unknown(e.to_string()))?;

        // Re-demux the still output to lift OBUs and configuration for
        // this crate's own container assembly.
        let parsed = boxes::demux(&encoded.avif_file)
            .map_err(|e| EncodeError::Unknown(format!("ravif output: {e}")))?;
        let still = parsed
            .still
            .ok_or_else(|| EncodeError::Unknown("ravif output has no item".into()))?;
        let av1c = parsed
            .av1c
            .ok_or_else(|| EncodeError::Unknown("ravif output has no av1C".into()))?;

        // Over-blended frames are forced sync points; every sample this
        // encoder emits is independently coded already, so the flag needs
        // no extra signaling in the sample table.
        let _force_keyframe = params.blend == Blend::Over;

        self.frames.push(EncodedFrame {
            color_obus: still.primary,
            alpha_obus: still.alpha,
            av1c,
            alpha_av1c: parsed.alpha_av1c,
            nclx: parsed.nclx,
            width: src.width(),
            height: src.height(),
            duration_ms: params.delay_ms.max(1),
        });
        Ok(())
    }

    /// Assemble the container into the output buffer and return its size.
    pub fn flush(&mut self) -> Result<usize, EncodeError> {
        if self.finalized {
            return Err(EncodeError::InvalidArg("encoder already finalized"));
        }
        if self.frames.is_empty() {
            return Err(EncodeError::InvalidArg("flush before any frame"));
        }

        let first = &self.frames[0];
        let color = ColorDescription {
            icc: self.icc.as_deref(),
            nclx: if self.icc.is_some() { None } else { first.nclx },
        };

        let out = if self.frames.len() == 1 {
            mux::pack_still(
                first.width,
                first.height,
                8,
                ItemPayload {
                    obus: &first.color_obus,
                    av1c: &first.av1c,
                },
                first.alpha_obus.as_ref().map(|obus| ItemPayload {
                    obus,
                    av1c: first.alpha_av1c.as_deref().unwrap_or(&first.av1c),
                }),
                &color,
                self.xmp.as_deref(),
            )
        } else {
            let durations: Vec<u32> = self.frames.iter().map(|f| f.duration_ms).collect();
            let color_samples: Vec<Vec<u8>> =
                self.frames.iter().map(|f| f.color_obus.clone()).collect();
            let all_alpha = self.frames.iter().all(|f| f.alpha_obus.is_some());
            let alpha_samples: Option<Vec<Vec<u8>>> = all_alpha.then(|| {
                self.frames
                    .iter()
                    .map(|f| f.alpha_obus.clone().expect("checked by all_alpha"))
                    .collect()
            });
            let alpha_av1c = self
                .frames
                .first()
                .and_then(|f| f.alpha_av1c.as_deref())
                .unwrap_or(&first.av1c);

            mux::pack_sequence(
                first.width,
                first.height,
                8,
                TIMESCALE,
                &durations,
                TrackPayload {
                    samples: &color_samples,
                    av1c: &first.av1c,
                    alpha: false,
                },
                alpha_samples.as_ref().map(|samples| TrackPayload {
                    samples,
                    av1c: alpha_av1c,
                    alpha: true,
                }),
                &color,
                self.xmp.as_deref(),
            )
        };

        if out.len() > self.dst.len() {
            return Err(EncodeError::BufferTooSmall {
                needed: out.len(),
                capacity: self.dst.len(),
            });
        }
        self.dst[..out.len()].copy_from_slice(&out);
        self.finalized = true;
        self.frames.clear();
        Ok(out.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flush_on_empty_encoder_is_invalid() {
        let mut buf = vec![0u8; 1024];
        let mut enc = AvifEncoder::new(&mut buf, None, None);
        assert_eq!(enc.flush().unwrap_err().code(), 5);
    }
}
