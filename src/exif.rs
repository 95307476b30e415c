//! Minimal EXIF scan for the TIFF orientation tag.
//!
//! Only the orientation is read; everything else in the IFD is skipped.
//! Handles both a bare TIFF blob (as found in WebP `EXIF` chunks) and a
//! JPEG APP1 payload prefixed with `Exif\0\0`.

use crate::orient::Orientation;

const ORIENTATION_TAG: u16 = 0x0112;
const FORMAT_U16: u16 = 3;

/// Extract the orientation from raw EXIF bytes, if present and valid.
pub(crate) fn orientation_from_exif(data: &[u8]) -> Option<Orientation> {
    let tiff = data.strip_prefix(b"Exif\0\0").unwrap_or(data);
    if tiff.len() < 8 {
        return None;
    }
    let big_endian = match &tiff[0..4] {
        [0x49, 0x49, 42, 0] => false,
        [0x4d, 0x4d, 0, 42] => true,
        _ => return None,
    };
    let ifd_offset = read_u32(tiff, 4, big_endian)? as usize;
    let entries = read_u16(tiff, ifd_offset, big_endian)?;
    for i in 0..entries as usize {
        let entry = ifd_offset + 2 + i * 12;
        let tag = read_u16(tiff, entry, big_endian)?;
        let format = read_u16(tiff, entry + 2, big_endian)?;
        let count = read_u32(tiff, entry + 4, big_endian)?;
        if tag == ORIENTATION_TAG && format == FORMAT_U16 && count == 1 {
            let value = read_u16(tiff, entry + 8, big_endian)?;
            return Orientation::from_exif(value.min(255) as u8);
        }
    }
    None
}

fn read_u16(data: &[u8], at: usize, big_endian: bool) -> Option<u16> {
    let bytes: [u8; 2] = data.get(at..at + 2)?.try_into().ok()?;
    Some(if big_endian {
        u16::from_be_bytes(bytes)
    } else {
        u16::from_le_bytes(bytes)
    })
}

fn read_u32(data: &[u8], at: usize, big_endian: bool) -> Option<u32> {
    let bytes: [u8; 4] = data.get(at..at + 4)?.try_into().ok()?;
    Some(if big_endian {
        u32::from_be_bytes(bytes)
    } else {
        u32::from_le_bytes(bytes)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiff_le(orientation: u16) -> Vec<u8> {
        let mut v = vec![0x49, 0x49, 42, 0, 8, 0, 0, 0];
        v.extend_from_slice(&1u16.to_le_bytes()); // one entry
        v.extend_from_slice(&ORIENTATION_TAG.to_le_bytes());
        v.extend_from_slice(&FORMAT_U16.to_le_bytes());
        v.extend_from_slice(&1u32.to_le_bytes());
        v.extend_from_slice(&orientation.to_le_bytes());
        v.extend_from_slice(&[0, 0]); // value padding
        v
    }

    #[test]
    fn parses_little_endian_orientation() {
        assert_eq!(
            orientation_from_exif(&tiff_le(6)),
            Some(Orientation::Rotate90)
        );
        assert_eq!(orientation_from_exif(&tiff_le(9)), None);
    }

    #[test]
    fn parses_app1_prefixed_payload() {
        let mut data = b"Exif\0\0".to_vec();
        data.extend_from_slice(&tiff_le(3));
        assert_eq!(
            orientation_from_exif(&data),
            Some(Orientation::Rotate180)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(orientation_from_exif(b"not exif at all"), None);
        assert_eq!(orientation_from_exif(b""), None);
    }
}
