use crate::anim::{AnimationHeader, Blend, Dispose, FrameHeader};
use crate::error::DecodeError;
use crate::limits::Limits;
use crate::matrix::PixelMatrix;
use crate::pixel::PixelType;

use super::boxes::{self, Demuxed, Nclx};
use super::profile::bt709_profile;
use super::tonemap;

/// AVIF decoder for primary items and `avis` image sequences.
///
/// The container is demuxed in-crate; AV1 temporal units are handed to
/// `dav1d`. Alpha arrives as an auxiliary item/track and is merged into
/// BGRA output. With tone mapping enabled, PQ/HLG BT.2020 sources are
/// compressed to SDR and the reported ICC profile becomes a fixed
/// BT.709 profile.
pub struct AvifDecoder<'a> {
    input: &'a [u8],
    demuxed: Demuxed,
    color_dec: dav1d::Decoder,
    alpha_dec: Option<dav1d::Decoder>,
    header: AnimationHeader,
    pixel: PixelType,
    tone_mapped: bool,
    durations_ms: Vec<u32>,
    frames_read: u32,
}

impl<'a> AvifDecoder<'a> {
    /// Parse the container. `tone_mapping_enabled` selects the HDR-to-SDR
    /// path for qualifying sources.
    pub fn new(data: &'a [u8], tone_mapping_enabled: bool) -> Result<Self, DecodeError> {
        Self::with_limits(data, tone_mapping_enabled, &Limits::default())
    }

    pub fn with_limits(
        data: &'a [u8],
        tone_mapping_enabled: bool,
        limits: &Limits,
    ) -> Result<Self, DecodeError> {
        let demuxed = boxes::demux(data)?;
        limits.check(demuxed.width, demuxed.height)?;
        limits.check_memory(
            demuxed.width as usize * demuxed.height as usize * 4,
        )?;

        let has_alpha = demuxed
            .still
            .as_ref()
            .is_some_and(|s| s.alpha.is_some())
            || demuxed.alpha_track.is_some();
        let pixel = if has_alpha {
            PixelType::Bgra8
        } else {
            PixelType::Bgr8
        };

        let (frame_count, durations_ms) = match &demuxed.color_track {
            Some(track) => {
                if track.samples.is_empty() {
                    return Err(DecodeError::CorruptFrame(
                        "sequence track has no samples".into(),
                    ));
                }
                let timescale = if track.timescale == 0 {
                    1000
                } else {
                    track.timescale
                };
                let durations: Vec<u32> = track
                    .durations
                    .iter()
                    .map(|&d| (d.saturating_mul(1000) / u64::from(timescale)) as u32)
                    .collect();
                (track.samples.len() as u32, durations)
            }
            None => (1, vec![0]),
        };
        let total_duration_ms = if frame_count > 1 {
            durations_ms.iter().fold(0u32, |a, &d| a.saturating_add(d))
        } else {
            0
        };

        let tone_mapped = tone_mapping_enabled && tonemap::is_hdr(demuxed.bit_depth, demuxed.nclx);
        let icc = if tone_mapped {
            Some(bt709_profile().to_vec())
        } else {
            demuxed.icc.clone()
        };

        let color_dec = new_decoder()?;
        let alpha_dec = if has_alpha {
            Some(new_decoder()?)
        } else {
            None
        };

        Ok(Self {
            header: AnimationHeader {
                canvas_width: demuxed.width,
                canvas_height: demuxed.height,
                frame_count,
                // Repetition is not carried by the sample tables; an
                // unknown count is reported as infinite.
                loop_count: 0,
                total_duration_ms,
                bg_color: 0xFFFF_FFFF,
                icc,
                xmp: demuxed.xmp.clone(),
            },
            pixel,
            tone_mapped,
            durations_ms,
            frames_read: 0,
            input: data,
            demuxed,
            color_dec,
            alpha_dec,
        })
    }

    pub fn width(&self) -> u32 {
        self.header.canvas_width
    }

    pub fn height(&self) -> u32 {
        self.header.canvas_height
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel
    }

    pub fn is_animated(&self) -> bool {
        self.header.frame_count > 1
    }

    pub fn frame_count(&self) -> u32 {
        self.header.frame_count
    }

    pub fn loop_count(&self) -> u32 {
        self.header.loop_count
    }

    pub fn total_duration_ms(&self) -> u32 {
        self.header.total_duration_ms
    }

    pub fn header(&self) -> &AnimationHeader {
        &self.header
    }

    /// Copy the ICC profile into `buf`; tone-mapped output reports the
    /// compiled-in BT.709 profile.
    pub fn icc(&self, buf: &mut [u8]) -> usize {
        self.header.icc_into(buf)
    }

    /// Copy the XMP metadata into `buf`; returns bytes copied.
    pub fn xmp(&self, buf: &mut [u8]) -> usize {
        self.header.xmp_into(buf)
    }

    /// Metadata of the upcoming frame.
    ///
    /// Dispose and blend are inferred from alpha signaling; there is no
    /// corresponding field in the container.
    pub fn frame_header(&self) -> FrameHeader {
        let index = self
            .frames_read
            .min(self.header.frame_count.saturating_sub(1)) as usize;
        let has_alpha = self.pixel.has_alpha();
        let (dispose, blend) = if self.is_animated() {
            (
                if has_alpha && self.demuxed.alpha_premultiplied {
                    Dispose::None
                } else {
                    Dispose::Background
                },
                if has_alpha { Blend::Over } else { Blend::Source },
            )
        } else {
            (
                Dispose::None,
                if has_alpha { Blend::Over } else { Blend::Source },
            )
        };
        FrameHeader {
            duration_ms: self.durations_ms.get(index).copied().unwrap_or(0),
            x_offset: self.demuxed.clap_offset.0.max(0) as u32,
            y_offset: self.demuxed.clap_offset.1.max(0) as u32,
            width: self.header.canvas_width,
            height: self.header.canvas_height,
            dispose,
            blend,
        }
    }

    pub fn has_more_frames(&self) -> bool {
        self.frames_read < self.header.frame_count
    }

    /// Advance the cursor without decoding pixels.
    ///
    /// Every sample is an independent temporal unit, so no decoder state
    /// needs to advance.
    pub fn skip_frame(&mut self) -> Result<(), DecodeError> {
        if !self.has_more_frames() {
            return Err(DecodeError::Eof);
        }
        self.frames_read += 1;
        Ok(())
    }

    /// Decode the current frame into `mat` and advance the cursor.
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
        let (w, h) = (self.header.canvas_width, self.header.canvas_height);
        if mat.width() < w || mat.height() < h {
            return Err(DecodeError::MatrixTooSmall {
                needed_width: w,
                needed_height: h,
                width: mat.width(),
                height: mat.height(),
            });
        }

        let index = self.frames_read as usize;
        let (color_bytes, alpha_bytes) = self.sample_bytes(index)?;

        let pic = decode_one(&mut self.color_dec, &color_bytes)?;
        if pic.width() < w || pic.height() < h {
            return Err(DecodeError::CorruptFrame("frame smaller than canvas".into()));
        }

        let mut rgb = yuv_to_rgb_f32(&pic, self.demuxed.nclx, w, h)?;
        let row_len = w as usize * 3;
        let mut bgr = vec![0u8; row_len * h as usize];
        if self.tone_mapped {
            tonemap::tonemap_rgb_to_bgr8(&mut rgb, self.demuxed.nclx, &mut bgr);
        } else {
            for (px, out) in rgb.chunks_exact(3).zip(bgr.chunks_exact_mut(3)) {
                out[0] = (px[2].clamp(0.0, 1.0) * 255.0).round() as u8;
                out[1] = (px[1].clamp(0.0, 1.0) * 255.0).round() as u8;
                out[2] = (px[0].clamp(0.0, 1.0) * 255.0).round() as u8;
            }
        }

        let alpha_plane = match (&mut self.alpha_dec, alpha_bytes) {
            (Some(dec), Some(bytes)) => {
                let apic = decode_one(dec, &bytes)?;
                Some(alpha_to_8bit(&apic, w, h)?)
            }
            _ => None,
        };

        let bpp = self.pixel.bytes_per_pixel();
        for y in 0..h {
            let src = &bgr[y as usize * row_len..(y as usize + 1) * row_len];
            let dst = &mut mat.row_mut(y)[..w as usize * bpp];
            if bpp == 3 {
                dst.copy_from_slice(src);
            } else {
                for (x, d) in dst.chunks_exact_mut(4).enumerate() {
                    d[0..3].copy_from_slice(&src[x * 3..x * 3 + 3]);
                    d[3] = alpha_plane
                        .as_ref()
                        .map_or(255, |a| a[y as usize * w as usize + x]);
                }
            }
        }

        self.frames_read += 1;
        Ok(())
    }

    /// Bytes of the current color (and alpha) sample.
    fn sample_bytes(&self, index: usize) -> Result<(Vec<u8>, Option<Vec<u8>>), DecodeError> {
        if let Some(still) = &self.demuxed.still {
            if self.demuxed.color_track.is_none() {
                return Ok((still.primary.clone(), still.alpha.clone()));
            }
        }
        let track = self
            .demuxed
            .color_track
            .as_ref()
            .ok_or_else(|| DecodeError::CorruptFrame("no color track".into()))?;
        let color = self.track_sample(track, index)?;
        let alpha = match &self.demuxed.alpha_track {
            Some(alpha_track) => Some(self.track_sample(alpha_track, index)?),
            None => None,
        };
        Ok((color, alpha))
    }

    fn track_sample(
        &self,
        track: &boxes::Track,
        index: usize,
    ) -> Result<Vec<u8>, DecodeError> {
        let &(offset, len) = track
            .samples
            .get(index)
            .ok_or(DecodeError::Eof)?;
        let start = usize::try_from(offset).map_err(|_| DecodeError::Truncated)?;
        let end = start
            .checked_add(usize::try_from(len).map_err(|_| DecodeError::Truncated)?)
            .ok_or(DecodeError::Truncated)?;
        self.input
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or(DecodeError::Truncated)
    }
}

fn new_decoder() -> Result<dav1d::Decoder, DecodeError> {
    let mut settings = dav1d::Settings::new();
    settings.set_n_threads(1);
    settings.set_max_frame_delay(1);
    dav1d::Decoder::with_settings(&settings)
        .map_err(|e| DecodeError::UnsupportedFeature(format!("dav1d init: {e}")))
}

/// Feed one temporal unit and pull its picture.
fn decode_one(dec: &mut dav1d::Decoder, data: &[u8]) -> Result<dav1d::Picture, DecodeError> {
    dec.send_data(data.to_vec(), None, None, None)
        .map_err(|e| DecodeError::CorruptFrame(format!("dav1d send: {e}")))?;
    for _ in 0..16 {
        match dec.get_picture() {
            Ok(pic) => return Ok(pic),
            Err(e) if e.is_again() => match dec.send_pending_data() {
                Ok(()) => {}
                Err(e2) if e2.is_again() => {}
                Err(e2) => return Err(DecodeError::CorruptFrame(format!("dav1d: {e2}"))),
            },
            Err(e) => return Err(DecodeError::CorruptFrame(format!("dav1d: {e}"))),
        }
    }
    Err(DecodeError::CorruptFrame(
        "dav1d produced no picture for sample".into(),
    ))
}

struct PlaneReader<'p> {
    data: &'p [u8],
    stride: usize,
    high_depth: bool,
}

impl PlaneReader<'_> {
    fn get(&self, x: usize, y: usize) -> u32 {
        if self.high_depth {
            let at = y * self.stride + x * 2;
            u32::from(u16::from_le_bytes([self.data[at], self.data[at + 1]]))
        } else {
            u32::from(self.data[y * self.stride + x])
        }
    }
}

/// Convert a decoded picture to interleaved normalized RGB.
///
/// The values keep the source transfer; SDR callers scale straight to
/// 8 bits, the HDR path linearizes and tone maps afterwards.
fn yuv_to_rgb_f32(
    pic: &dav1d::Picture,
    nclx: Option<Nclx>,
    width: u32,
    height: u32,
) -> Result<Vec<f32>, DecodeError> {
    use dav1d::PlanarImageComponent;

    let depth = pic.bit_depth() as u32;
    let high_depth = depth > 8;
    let layout = pic.pixel_layout();
    let (ss_x, ss_y) = match layout {
        dav1d::PixelLayout::I400 | dav1d::PixelLayout::I444 => (0u32, 0u32),
        dav1d::PixelLayout::I420 => (1, 1),
        dav1d::PixelLayout::I422 => (1, 0),
    };

    let y_plane = pic.plane(PlanarImageComponent::Y);
    let y_reader = PlaneReader {
        data: &y_plane,
        stride: pic.stride(PlanarImageComponent::Y) as usize,
        high_depth,
    };
    let (u_plane, v_plane);
    let (u_reader, v_reader) = if layout == dav1d::PixelLayout::I400 {
        (None, None)
    } else {
        u_plane = pic.plane(PlanarImageComponent::U);
        v_plane = pic.plane(PlanarImageComponent::V);
        (
            Some(PlaneReader {
                data: &u_plane,
                stride: pic.stride(PlanarImageComponent::U) as usize,
                high_depth,
            }),
            Some(PlaneReader {
                data: &v_plane,
                stride: pic.stride(PlanarImageComponent::V) as usize,
                high_depth,
            }),
        )
    };

    let full_range = nclx.map_or(false, |n| n.full_range);
    let matrix = nclx.map_or(6, |n| n.matrix_coefficients);
    let (kr, kb) = match matrix {
        1 => (0.2126f32, 0.0722f32),
        9 | 10 => (0.2627, 0.0593),
        _ => (0.299, 0.114),
    };
    let identity = matrix == 0;

    let max = ((1u32 << depth) - 1) as f32;
    let scale = 1u32 << (depth - 8);
    let (y_off, y_rng, c_rng) = if full_range {
        (0.0f32, max, max)
    } else {
        (
            (16 * scale) as f32,
            (219 * scale) as f32,
            (224 * scale) as f32,
        )
    };
    let c_mid = (1u32 << (depth - 1)) as f32;

    let mut out = vec![0f32; width as usize * height as usize * 3];
    for yy in 0..height as usize {
        for xx in 0..width as usize {
            let y = (y_reader.get(xx, yy) as f32 - y_off) / y_rng;
            let (cb, cr) = match (&u_reader, &v_reader) {
                (Some(u), Some(v)) => {
                    let cx = xx >> ss_x;
                    let cy = yy >> ss_y;
                    (
                        (u.get(cx, cy) as f32 - c_mid) / c_rng,
                        (v.get(cx, cy) as f32 - c_mid) / c_rng,
                    )
                }
                _ => (0.0, 0.0),
            };
            let (r, g, b) = if identity {
                // Identity matrix carries GBR planes.
                (cr + 0.5, y, cb + 0.5)
            } else {
                let r = y + 2.0 * (1.0 - kr) * cr;
                let b = y + 2.0 * (1.0 - kb) * cb;
                let kg = 1.0 - kr - kb;
                let g = (y - kr * r - kb * b) / kg;
                (r, g, b)
            };
            let at = (yy * width as usize + xx) * 3;
            out[at] = r;
            out[at + 1] = g;
            out[at + 2] = b;
        }
    }
    Ok(out)
}

/// Extract the alpha auxiliary picture's luma as an 8-bit plane.
fn alpha_to_8bit(
    pic: &dav1d::Picture,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, DecodeError> {
    use dav1d::PlanarImageComponent;

    if pic.width() < width || pic.height() < height {
        return Err(DecodeError::CorruptFrame("alpha smaller than canvas".into()));
    }
    let depth = pic.bit_depth() as u32;
    let plane = pic.plane(PlanarImageComponent::Y);
    let reader = PlaneReader {
        data: &plane,
        stride: pic.stride(PlanarImageComponent::Y) as usize,
        high_depth: depth > 8,
    };
    let shift = depth.saturating_sub(8);
    let mut out = vec![0u8; width as usize * height as usize];
    for y in 0..height as usize {
        for x in 0..width as usize {
            out[y * width as usize + x] = (reader.get(x, y) >> shift) as u8;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avif::mux::{self, ColorDescription, TrackPayload};

    #[test]
    fn zero_sample_sequence_is_rejected() {
        // A structurally valid avis whose color track has no samples
        // must fail header parse, not panic later.
        let data = mux::pack_sequence(
            8,
            8,
            8,
            1000,
            &[],
            TrackPayload {
                samples: &[],
                av1c: &[0x81, 0x1F, 0x0C, 0x10],
                alpha: false,
            },
            None,
            &ColorDescription {
                icc: None,
                nclx: None,
            },
            None,
        );
        let err = match AvifDecoder::new(&data, false) {
            Err(err) => err,
            Ok(_) => panic!("zero-sample sequence must not decode"),
        };
        assert!(matches!(err, DecodeError::CorruptFrame(_)));
    }
}
