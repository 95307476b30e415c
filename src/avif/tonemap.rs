//! HDR to SDR tone mapping for AVIF sources.
//!
//! Pipeline: normalized HDR RGB -> linear light (PQ/HLG EOTF) ->
//! Reinhard luminance compression -> primaries conversion to BT.709 ->
//! sRGB transfer -> 8-bit quantization.

use super::boxes::Nclx;

pub(crate) const TRANSFER_PQ: u16 = 16;
pub(crate) const TRANSFER_HLG: u16 = 18;
pub(crate) const PRIMARIES_BT2020: u16 = 9;
pub(crate) const PRIMARIES_P3_SMPTE432: u16 = 12;
pub(crate) const PRIMARIES_P3_DCI: u16 = 11;
pub(crate) const PRIMARIES_BT601: u16 = 6;

/// Whether the source needs the tone-mapping path: more than 8 bits with
/// BT.2020 primaries or a PQ/HLG transfer.
pub(crate) fn is_hdr(bit_depth: u8, nclx: Option<Nclx>) -> bool {
    if bit_depth <= 8 {
        return false;
    }
    let Some(nclx) = nclx else {
        return false;
    };
    nclx.color_primaries == PRIMARIES_BT2020
        || nclx.transfer_characteristics == TRANSFER_PQ
        || nclx.transfer_characteristics == TRANSFER_HLG
}

/// SMPTE ST.2084 (PQ) EOTF.
fn pq_to_linear(x: f32) -> f32 {
    const M1: f32 = 0.159_301_76;
    const M2: f32 = 78.84375;
    const C1: f32 = 0.8359375;
    const C2: f32 = 18.8515625;
    const C3: f32 = 18.6875;

    let xpow = x.powf(1.0 / M2);
    let num = (xpow - C1).max(0.0);
    let den = C2 - C3 * xpow;
    (num / den).powf(1.0 / M1)
}

/// Hybrid log-gamma EOTF.
fn hlg_to_linear(x: f32) -> f32 {
    const A: f32 = 0.178_832_77;
    const B: f32 = 0.284_668_92;
    const C: f32 = 0.559_910_73;

    if x <= 0.5 {
        x * x / 3.0
    } else {
        (((x - C) / A).exp() + B) / 12.0
    }
}

const BT2020_TO_BT709: [f32; 9] = [
    1.6605, -0.5876, -0.0728, -0.1246, 1.1329, -0.0083, -0.0182, -0.1006, 1.1187,
];

const P3_TO_BT709: [f32; 9] = [
    1.2249, -0.2247, -0.0002, -0.0420, 1.0419, 0.0001, -0.0197, 0.0754, 0.9443,
];

const BT601_TO_BT709: [f32; 9] = [
    1.0440, -0.0440, 0.0000, -0.0000, 1.0000, 0.0000, 0.0000, 0.0000, 1.0000,
];

fn srgb_encode(c: f32) -> f32 {
    if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Tone map one pixel buffer of normalized HDR RGB in place, writing
/// 8-bit BGR to `dst` (`dst.len() == rgb.len()`).
///
/// `rgb` holds interleaved `[r, g, b]` values in `[0, 1]` carrying the
/// source transfer.
pub(crate) fn tonemap_rgb_to_bgr8(rgb: &mut [f32], nclx: Option<Nclx>, dst: &mut [u8]) {
    debug_assert_eq!(rgb.len(), dst.len());
    debug_assert_eq!(rgb.len() % 3, 0);

    let transfer = nclx.map_or(0, |n| n.transfer_characteristics);
    let primaries = nclx.map_or(0, |n| n.color_primaries);

    // Transfer to linear light.
    match transfer {
        TRANSFER_PQ => rgb.iter_mut().for_each(|v| *v = pq_to_linear(*v)),
        TRANSFER_HLG => rgb.iter_mut().for_each(|v| *v = hlg_to_linear(*v)),
        _ => {}
    }

    // Reinhard on BT.709-weighted luminance, preserving hue.
    for px in rgb.chunks_exact_mut(3) {
        let luma = 0.2126 * px[0] + 0.7152 * px[1] + 0.0722 * px[2];
        if luma > 0.0 {
            let scale = (luma / (1.0 + luma)) / luma;
            px[0] *= scale;
            px[1] *= scale;
            px[2] *= scale;
        }
    }

    // Convert to BT.709 primaries.
    let matrix = match primaries {
        PRIMARIES_BT2020 => Some(&BT2020_TO_BT709),
        PRIMARIES_P3_SMPTE432 | PRIMARIES_P3_DCI => Some(&P3_TO_BT709),
        PRIMARIES_BT601 => Some(&BT601_TO_BT709),
        _ => None,
    };
    if let Some(m) = matrix {
        for px in rgb.chunks_exact_mut(3) {
            let (r, g, b) = (px[0], px[1], px[2]);
            px[0] = m[0] * r + m[1] * g + m[2] * b;
            px[1] = m[3] * r + m[4] * g + m[5] * b;
            px[2] = m[6] * r + m[7] * g + m[8] * b;
        }
    }

    // sRGB transfer and quantization, channel order flipped to BGR.
    for (px, out) in rgb.chunks_exact(3).zip(dst.chunks_exact_mut(3)) {
        for c in 0..3 {
            let v = srgb_encode(px[c].clamp(0.0, 1.0));
            out[2 - c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pq_endpoints() {
        assert!(pq_to_linear(0.0).abs() < 1e-6);
        // PQ encodes up to 10000 nits; 1.0 maps to the maximum.
        assert!((pq_to_linear(1.0) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn hlg_is_monotonic() {
        let mut prev = -1.0f32;
        for i in 0..=100 {
            let v = hlg_to_linear(i as f32 / 100.0);
            assert!(v >= prev);
            prev = v;
        }
    }

    #[test]
    fn tonemap_keeps_black_and_compresses_highlights() {
        let nclx = Nclx {
            color_primaries: PRIMARIES_BT2020,
            transfer_characteristics: TRANSFER_PQ,
            matrix_coefficients: 9,
            full_range: true,
        };
        let mut rgb = vec![0.0f32, 0.0, 0.0, 0.9, 0.9, 0.9];
        let mut dst = vec![0u8; 6];
        tonemap_rgb_to_bgr8(&mut rgb, Some(nclx), &mut dst);
        assert_eq!(&dst[..3], &[0, 0, 0]);
        // A bright PQ input stays below clipping after Reinhard.
        assert!(dst[3] > 0 && dst[3] < 255);
    }

    #[test]
    fn hdr_detection() {
        let pq = Nclx {
            color_primaries: 1,
            transfer_characteristics: TRANSFER_PQ,
            matrix_coefficients: 1,
            full_range: true,
        };
        assert!(is_hdr(10, Some(pq)));
        assert!(!is_hdr(8, Some(pq)));
        assert!(!is_hdr(10, None));
    }
}
