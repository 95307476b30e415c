//! EXIF orientation transforms (TIFF 6.0 values 1-8).

use crate::error::MatrixError;
use crate::matrix::PixelMatrix;

/// EXIF orientation as stored in the TIFF orientation tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Orientation {
    /// 1 — row 0 top, column 0 left.
    Normal = 1,
    /// 2 — mirrored across the vertical axis.
    MirrorHorizontal = 2,
    /// 3 — rotated 180 degrees.
    Rotate180 = 3,
    /// 4 — mirrored across the horizontal axis.
    MirrorVertical = 4,
    /// 5 — mirrored across the top-left/bottom-right diagonal.
    Transpose = 5,
    /// 6 — rotated 90 degrees clockwise.
    Rotate90 = 6,
    /// 7 — mirrored across the top-right/bottom-left diagonal.
    Transverse = 7,
    /// 8 — rotated 270 degrees clockwise.
    Rotate270 = 8,
}

impl Orientation {
    /// Parse a TIFF orientation tag value.
    pub fn from_exif(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Normal),
            2 => Some(Self::MirrorHorizontal),
            3 => Some(Self::Rotate180),
            4 => Some(Self::MirrorVertical),
            5 => Some(Self::Transpose),
            6 => Some(Self::Rotate90),
            7 => Some(Self::Transverse),
            8 => Some(Self::Rotate270),
            _ => None,
        }
    }

    /// The TIFF orientation tag value.
    pub fn exif_value(self) -> u8 {
        self as u8
    }

    /// Whether applying this orientation swaps width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    /// 2x2 coordinate matrix of the transform (`x' = m0*x + m1*y`,
    /// `y' = m2*x + m3*y`, with negative axes re-anchored to the image edge).
    const fn matrix(self) -> [i8; 4] {
        match self {
            Self::Normal => [1, 0, 0, 1],
            Self::MirrorHorizontal => [-1, 0, 0, 1],
            Self::Rotate180 => [-1, 0, 0, -1],
            Self::MirrorVertical => [1, 0, 0, -1],
            Self::Transpose => [0, 1, 1, 0],
            Self::Rotate90 => [0, -1, 1, 0],
            Self::Transverse => [0, -1, -1, 0],
            Self::Rotate270 => [0, 1, -1, 0],
        }
    }

    /// The single orientation equivalent to applying `self`, then `next`.
    pub fn then(self, next: Orientation) -> Orientation {
        let a = self.matrix();
        let b = next.matrix();
        let m = [
            b[0] * a[0] + b[1] * a[2],
            b[0] * a[1] + b[1] * a[3],
            b[2] * a[0] + b[3] * a[2],
            b[2] * a[1] + b[3] * a[3],
        ];
        const ALL: [Orientation; 8] = [
            Orientation::Normal,
            Orientation::MirrorHorizontal,
            Orientation::Rotate180,
            Orientation::MirrorVertical,
            Orientation::Transpose,
            Orientation::Rotate90,
            Orientation::Transverse,
            Orientation::Rotate270,
        ];
        for o in ALL {
            if o.matrix() == m {
                return o;
            }
        }
        unreachable!("orientation matrices are closed under composition")
    }
}

/// Apply an EXIF orientation to a matrix in place.
///
/// Orientations 2-4 rearrange pixels within the existing storage; 5-8 swap
/// the logical width and height through a temporary. Channel order is
/// preserved.
pub fn orientation_transform(
    mat: &mut PixelMatrix<'_>,
    orientation: Orientation,
) -> Result<(), MatrixError> {
    let w = mat.width();
    let h = mat.height();
    let bpp = mat.pixel_type().bytes_per_pixel();
    match orientation {
        Orientation::Normal => Ok(()),
        Orientation::MirrorHorizontal => {
            for y in 0..h {
                reverse_pixels(mat.row_mut(y), bpp);
            }
            Ok(())
        }
        Orientation::Rotate180 => {
            flip_rows(mat);
            for y in 0..h {
                reverse_pixels(mat.row_mut(y), bpp);
            }
            Ok(())
        }
        Orientation::MirrorVertical => {
            flip_rows(mat);
            Ok(())
        }
        Orientation::Transpose
        | Orientation::Rotate90
        | Orientation::Transverse
        | Orientation::Rotate270 => {
            let (dst_w, dst_h) = (h, w);
            let mut out = vec![0u8; dst_w as usize * dst_h as usize * bpp];
            let dst_stride = dst_w as usize * bpp;
            for y in 0..h {
                let row = mat.row(y);
                for x in 0..w {
                    let (dx, dy) = match orientation {
                        Orientation::Transpose => (y, x),
                        Orientation::Rotate90 => (h - 1 - y, x),
                        Orientation::Transverse => (h - 1 - y, w - 1 - x),
                        Orientation::Rotate270 => (y, w - 1 - x),
                        _ => unreachable!(),
                    };
                    let src = &row[x as usize * bpp..(x as usize + 1) * bpp];
                    let off = dy as usize * dst_stride + dx as usize * bpp;
                    out[off..off + bpp].copy_from_slice(src);
                }
            }
            mat.replace_owned(out, dst_w, dst_h)
        }
    }
}

fn reverse_pixels(row: &mut [u8], bpp: usize) {
    let n = row.len() / bpp;
    for i in 0..n / 2 {
        let j = n - 1 - i;
        for c in 0..bpp {
            row.swap(i * bpp + c, j * bpp + c);
        }
    }
}

fn flip_rows(mat: &mut PixelMatrix<'_>) {
    let h = mat.height();
    let row_len = mat.width() as usize * mat.pixel_type().bytes_per_pixel();
    let mut tmp = vec![0u8; row_len];
    for y in 0..h / 2 {
        let y2 = h - 1 - y;
        tmp.copy_from_slice(mat.row(y));
        let (a, b) = (y, y2);
        let src: Vec<u8> = mat.row(b).to_vec();
        mat.row_mut(a).copy_from_slice(&src);
        mat.row_mut(b).copy_from_slice(&tmp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::PixelType;

    fn gray(pixels: &[u8], w: u32, h: u32) -> PixelMatrix<'static> {
        let mut m = PixelMatrix::new(w, h, PixelType::Gray8).unwrap();
        for y in 0..h {
            m.row_mut(y)
                .copy_from_slice(&pixels[(y * w) as usize..((y + 1) * w) as usize]);
        }
        m
    }

    fn collect(m: &PixelMatrix<'_>) -> Vec<u8> {
        let mut out = Vec::new();
        for y in 0..m.height() {
            out.extend_from_slice(m.row(y));
        }
        out
    }

    #[test]
    fn rotate90_swaps_dimensions() {
        // 2 rows x 3 columns
        let mut m = gray(&[1, 2, 3, 4, 5, 6], 3, 2);
        orientation_transform(&mut m, Orientation::Rotate90).unwrap();
        assert_eq!((m.width(), m.height()), (2, 3));
        assert_eq!(collect(&m), vec![4, 1, 5, 2, 6, 3]);
    }

    #[test]
    fn rotate90_four_times_is_identity() {
        let pixels = [9, 2, 3, 4, 5, 6, 7, 8, 1, 10, 11, 12];
        let mut m = gray(&pixels, 4, 3);
        for _ in 0..4 {
            orientation_transform(&mut m, Orientation::Rotate90).unwrap();
        }
        assert_eq!((m.width(), m.height()), (4, 3));
        assert_eq!(collect(&m), pixels.to_vec());
    }

    #[test]
    fn mirror_and_flip() {
        let mut m = gray(&[1, 2, 3, 4], 2, 2);
        orientation_transform(&mut m, Orientation::MirrorHorizontal).unwrap();
        assert_eq!(collect(&m), vec![2, 1, 4, 3]);
        let mut m = gray(&[1, 2, 3, 4], 2, 2);
        orientation_transform(&mut m, Orientation::MirrorVertical).unwrap();
        assert_eq!(collect(&m), vec![3, 4, 1, 2]);
        let mut m = gray(&[1, 2, 3, 4], 2, 2);
        orientation_transform(&mut m, Orientation::Rotate180).unwrap();
        assert_eq!(collect(&m), vec![4, 3, 2, 1]);
    }

    #[test]
    fn composition_matches_sequential_application() {
        const ALL: [Orientation; 8] = [
            Orientation::Normal,
            Orientation::MirrorHorizontal,
            Orientation::Rotate180,
            Orientation::MirrorVertical,
            Orientation::Transpose,
            Orientation::Rotate90,
            Orientation::Transverse,
            Orientation::Rotate270,
        ];
        // An asymmetric image distinguishes every element of the group.
        let pixels = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12];
        for a in ALL {
            for b in ALL {
                let mut sequential = gray(&pixels, 4, 3);
                orientation_transform(&mut sequential, a).unwrap();
                orientation_transform(&mut sequential, b).unwrap();

                let mut composed = gray(&pixels, 4, 3);
                orientation_transform(&mut composed, a.then(b)).unwrap();

                assert_eq!(
                    collect(&sequential),
                    collect(&composed),
                    "composing {a:?} then {b:?}"
                );
                assert_eq!(
                    (sequential.width(), sequential.height()),
                    (composed.width(), composed.height())
                );
            }
        }
    }

    #[test]
    fn bgr_channel_order_preserved() {
        let mut m = PixelMatrix::new(2, 1, PixelType::Bgr8).unwrap();
        m.row_mut(0).copy_from_slice(&[10, 20, 30, 40, 50, 60]);
        orientation_transform(&mut m, Orientation::Rotate90).unwrap();
        assert_eq!((m.width(), m.height()), (1, 2));
        assert_eq!(m.row(0), &[10, 20, 30]);
        assert_eq!(m.row(1), &[40, 50, 60]);
    }
}
