//! Compiled-in BT.709 ICC profile reported for tone-mapped output.
//!
//! Assembled once at first use: an ICC v4 display profile with the
//! BT.709/sRGB primaries (D50-adapted), a D50 white point, and a gamma
//! 2.2 parametric curve per channel.

use std::sync::OnceLock;

fn s15f16(v: f64) -> [u8; 4] {
    ((v * 65536.0).round() as i32).to_be_bytes()
}

fn tag(fourcc: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 4);
    out.extend_from_slice(fourcc);
    out.extend_from_slice(body);
    out
}

fn xyz_tag(x: f64, y: f64, z: f64) -> Vec<u8> {
    let mut body = vec![0u8; 4];
    body.extend_from_slice(&s15f16(x));
    body.extend_from_slice(&s15f16(y));
    body.extend_from_slice(&s15f16(z));
    tag(b"XYZ ", &body)
}

fn text_tag(text: &str) -> Vec<u8> {
    // 'mluc' with a single en-US record.
    let utf16: Vec<u8> = text.encode_utf16().flat_map(u16::to_be_bytes).collect();
    let mut body = Vec::new();
    body.extend_from_slice(&[0; 4]);
    body.extend_from_slice(&1u32.to_be_bytes()); // record count
    body.extend_from_slice(&12u32.to_be_bytes()); // record size
    body.extend_from_slice(b"enUS");
    body.extend_from_slice(&(utf16.len() as u32).to_be_bytes());
    body.extend_from_slice(&28u32.to_be_bytes()); // offset from tag start
    body.extend_from_slice(&utf16);
    tag(b"mluc", &body)
}

fn gamma_tag() -> Vec<u8> {
    // parametricCurveType, function 0: Y = X^g with g = 2.2.
    let mut body = vec![0u8; 4];
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&s15f16(2.2));
    tag(b"para", &body)
}

fn build() -> Vec<u8> {
    // (signature, data) in file order.
    let trc = gamma_tag();
    let tags: Vec<([u8; 4], Vec<u8>)> = vec![
        (*b"desc", text_tag("Rec. ITU-R BT.709")),
        (*b"cprt", text_tag("Public Domain")),
        // D50 white point.
        (*b"wtpt", xyz_tag(0.96420, 1.00000, 0.82491)),
        // BT.709 primaries chromatically adapted to D50.
        (*b"rXYZ", xyz_tag(0.43607, 0.22249, 0.01392)),
        (*b"gXYZ", xyz_tag(0.38515, 0.71687, 0.09708)),
        (*b"bXYZ", xyz_tag(0.14307, 0.06061, 0.71410)),
        (*b"rTRC", trc.clone()),
        (*b"gTRC", trc.clone()),
        (*b"bTRC", trc),
    ];

    let header_len = 128usize;
    let table_len = 4 + tags.len() * 12;
    let mut offset = header_len + table_len;

    let mut table = Vec::with_capacity(table_len);
    table.extend_from_slice(&(tags.len() as u32).to_be_bytes());
    let mut data = Vec::new();
    for (sig, body) in &tags {
        table.extend_from_slice(sig);
        table.extend_from_slice(&(offset as u32).to_be_bytes());
        table.extend_from_slice(&(body.len() as u32).to_be_bytes());
        data.extend_from_slice(body);
        // Tag data is 4-byte aligned.
        let pad = (4 - body.len() % 4) % 4;
        data.extend_from_slice(&vec![0u8; pad]);
        offset += body.len() + pad;
    }

    let total = header_len + table_len + data.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(total as u32).to_be_bytes());
    out.extend_from_slice(b"none"); // preferred CMM
    out.extend_from_slice(&0x0430_0000u32.to_be_bytes()); // version 4.3
    out.extend_from_slice(b"mntr");
    out.extend_from_slice(b"RGB ");
    out.extend_from_slice(b"XYZ ");
    out.extend_from_slice(&[0u8; 12]); // creation date
    out.extend_from_slice(b"acsp");
    out.extend_from_slice(&[0u8; 4]); // platform
    out.extend_from_slice(&[0u8; 4]); // flags
    out.extend_from_slice(&[0u8; 4]); // manufacturer
    out.extend_from_slice(&[0u8; 4]); // model
    out.extend_from_slice(&[0u8; 8]); // attributes
    out.extend_from_slice(&[0u8; 4]); // rendering intent: perceptual
    out.extend_from_slice(&s15f16(0.96420)); // PCS illuminant
    out.extend_from_slice(&s15f16(1.00000));
    out.extend_from_slice(&s15f16(0.82491));
    out.extend_from_slice(&[0u8; 4]); // creator
    out.extend_from_slice(&[0u8; 16]); // profile id
    out.extend_from_slice(&[0u8; 28]); // reserved
    debug_assert_eq!(out.len(), header_len);
    out.extend_from_slice(&table);
    out.extend_from_slice(&data);
    out
}

/// The profile bytes, built once.
pub(crate) fn bt709_profile() -> &'static [u8] {
    static PROFILE: OnceLock<Vec<u8>> = OnceLock::new();
    PROFILE.get_or_init(build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_is_well_formed() {
        let p = bt709_profile();
        assert_eq!(
            u32::from_be_bytes(p[0..4].try_into().unwrap()) as usize,
            p.len()
        );
        assert_eq!(&p[36..40], b"acsp");
        assert_eq!(&p[12..16], b"mntr");
        assert_eq!(&p[16..20], b"RGB ");
        // Tag count and first signature.
        let count = u32::from_be_bytes(p[128..132].try_into().unwrap());
        assert_eq!(count, 9);
        assert_eq!(&p[132..136], b"desc");
    }
}
