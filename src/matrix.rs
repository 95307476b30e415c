//! Rectangular pixel buffer shared by all decoders and encoders.
//!
//! A [`PixelMatrix`] either owns its storage or wraps a caller buffer with
//! a recorded capacity; [`crop`](PixelMatrix::crop) yields borrowed views
//! over the same bytes. Row stride may exceed `width * bytes_per_pixel`
//! for decoders that need padded rows.

use crate::error::MatrixError;
use crate::pixel::PixelType;

#[derive(Debug)]
enum Storage<'buf> {
    Owned(Vec<u8>),
    Wrapped(&'buf mut [u8]),
}

impl Storage<'_> {
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Owned(v) => v,
            Storage::Wrapped(b) => b,
        }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        match self {
            Storage::Owned(v) => v,
            Storage::Wrapped(b) => b,
        }
    }
}

/// Owning or wrapping rectangular pixel buffer.
#[derive(Debug)]
pub struct PixelMatrix<'buf> {
    storage: Storage<'buf>,
    width: u32,
    height: u32,
    pixel: PixelType,
    stride: usize,
}

impl PixelMatrix<'static> {
    /// Allocate an owned, zero-filled matrix with minimal stride.
    pub fn new(width: u32, height: u32, pixel: PixelType) -> Result<Self, MatrixError> {
        let stride = (width as usize)
            .checked_mul(pixel.bytes_per_pixel())
            .ok_or(MatrixError::DimensionsTooLarge { width, height })?;
        let total = stride
            .checked_mul(height as usize)
            .ok_or(MatrixError::DimensionsTooLarge { width, height })?;
        Ok(Self {
            storage: Storage::Owned(vec![0u8; total]),
            width,
            height,
            pixel,
            stride,
        })
    }
}

impl<'buf> PixelMatrix<'buf> {
    /// Wrap a caller buffer as a `width x height` matrix.
    ///
    /// Fails when `width * height * bytes_per_pixel` exceeds `buf.len()`.
    /// The full buffer length is recorded as the capacity limit, so the
    /// stride may later be widened with [`set_row_stride`](Self::set_row_stride).
    pub fn from_buf(
        width: u32,
        height: u32,
        pixel: PixelType,
        buf: &'buf mut [u8],
    ) -> Result<Self, MatrixError> {
        let stride = (width as usize)
            .checked_mul(pixel.bytes_per_pixel())
            .ok_or(MatrixError::DimensionsTooLarge { width, height })?;
        let needed = stride
            .checked_mul(height as usize)
            .ok_or(MatrixError::DimensionsTooLarge { width, height })?;
        if needed > buf.len() {
            return Err(MatrixError::BufferTooSmall {
                needed,
                actual: buf.len(),
            });
        }
        Ok(Self {
            storage: Storage::Wrapped(buf),
            width,
            height,
            pixel,
            stride,
        })
    }

    /// Wrap a caller buffer as an empty (1x0) output sink.
    ///
    /// The matrix has no pixels yet but records `buf.len()` as capacity;
    /// once bytes have been produced into the buffer, claim them with
    /// [`assume_filled`](Self::assume_filled).
    pub fn empty_from_buf(buf: &'buf mut [u8]) -> Self {
        Self {
            storage: Storage::Wrapped(buf),
            width: 1,
            height: 0,
            pixel: PixelType::Gray8,
            stride: 1,
        }
    }

    /// Re-describe the wrapped bytes as a filled `width x height` matrix.
    ///
    /// Used with [`empty_from_buf`](Self::empty_from_buf) after an encoder
    /// has produced into the wrapped buffer.
    pub fn assume_filled(
        &mut self,
        width: u32,
        height: u32,
        pixel: PixelType,
    ) -> Result<(), MatrixError> {
        let stride = (width as usize)
            .checked_mul(pixel.bytes_per_pixel())
            .ok_or(MatrixError::DimensionsTooLarge { width, height })?;
        let needed = stride
            .checked_mul(height as usize)
            .ok_or(MatrixError::DimensionsTooLarge { width, height })?;
        if needed > self.capacity() {
            return Err(MatrixError::BufferTooSmall {
                needed,
                actual: self.capacity(),
            });
        }
        self.width = width;
        self.height = height;
        self.pixel = pixel;
        self.stride = stride;
        Ok(())
    }

    /// Columns.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Rows.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Channel layout.
    pub fn pixel_type(&self) -> PixelType {
        self.pixel
    }

    /// Bytes between the starts of consecutive rows.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Total bytes available in the backing storage.
    pub fn capacity(&self) -> usize {
        self.storage.bytes().len()
    }

    fn min_stride(&self) -> usize {
        self.width as usize * self.pixel.bytes_per_pixel()
    }

    /// Number of backing bytes covered by the pixel rectangle.
    fn used_bytes(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        (self.height as usize - 1) * self.stride + self.min_stride()
    }

    /// Widen the row stride before handing the matrix to a decoder that
    /// needs padded rows.
    ///
    /// Only legal while the stride is still minimal; the widened rows must
    /// fit within the recorded capacity.
    pub fn set_row_stride(&mut self, stride: usize) -> Result<(), MatrixError> {
        if stride == self.stride {
            return Ok(());
        }
        let min = self.min_stride();
        if stride < min || self.stride != min {
            return Err(MatrixError::InvalidStride {
                stride,
                width: self.width,
            });
        }
        let needed = stride
            .checked_mul(self.height as usize)
            .ok_or(MatrixError::InvalidStride {
                stride,
                width: self.width,
            })?;
        if needed > self.capacity() {
            return Err(MatrixError::BufferTooSmall {
                needed,
                actual: self.capacity(),
            });
        }
        self.stride = stride;
        Ok(())
    }

    /// Zero-fill the pixel rectangle.
    pub fn reset(&mut self) {
        let used = self.used_bytes();
        self.storage.bytes_mut()[..used].fill(0);
    }

    /// Fill every pixel with a constant color.
    ///
    /// 3-channel matrices ignore `a`; grayscale matrices use `r`.
    pub fn set_fill(&mut self, r: u8, g: u8, b: u8, a: u8) {
        let mut px = [0u8; 4];
        match self.pixel {
            PixelType::Gray8 => px[0] = r,
            PixelType::Bgr8 => px[..3].copy_from_slice(&[b, g, r]),
            PixelType::Bgra8 => px.copy_from_slice(&[b, g, r, a]),
        }
        let bpp = self.pixel.bytes_per_pixel();
        for y in 0..self.height {
            for chunk in self.row_mut(y).chunks_exact_mut(bpp) {
                chunk.copy_from_slice(&px[..bpp]);
            }
        }
    }

    /// One row of pixels (`width * bytes_per_pixel` bytes).
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.storage.bytes()[start..start + self.min_stride()]
    }

    /// One mutable row of pixels.
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let len = self.min_stride();
        &mut self.storage.bytes_mut()[start..start + len]
    }

    /// The used backing bytes (`(height-1) * stride + width * bpp`).
    pub fn bytes(&self) -> &[u8] {
        let used = self.used_bytes();
        &self.storage.bytes()[..used]
    }

    /// The used backing bytes, mutably.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        let used = self.used_bytes();
        &mut self.storage.bytes_mut()[..used]
    }

    /// Borrow the whole matrix as a read-only slice descriptor.
    pub fn as_slice(&self) -> PixelSlice<'_> {
        PixelSlice {
            data: self.bytes(),
            width: self.width,
            height: self.height,
            stride: self.stride,
            pixel: self.pixel,
        }
    }

    /// Borrow the whole matrix as a mutable slice descriptor.
    pub fn as_slice_mut(&mut self) -> PixelSliceMut<'_> {
        let width = self.width;
        let height = self.height;
        let stride = self.stride;
        let pixel = self.pixel;
        PixelSliceMut {
            data: self.bytes_mut(),
            width,
            height,
            stride,
            pixel,
        }
    }

    /// A read-only view of the `(x, y, w, h)` sub-rectangle.
    ///
    /// The view shares this matrix's backing bytes and keeps its stride.
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Result<PixelSlice<'_>, MatrixError> {
        self.as_slice().crop(x, y, w, h)
    }

    /// A mutable view of the `(x, y, w, h)` sub-rectangle.
    pub fn crop_mut(
        &mut self,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
    ) -> Result<PixelSliceMut<'_>, MatrixError> {
        self.as_slice_mut().into_crop(x, y, w, h)
    }

    /// Apply an EXIF orientation (1-8) in place; orientations 5-8 swap
    /// the logical width and height.
    pub fn orientation_transform(
        &mut self,
        orientation: crate::orient::Orientation,
    ) -> Result<(), MatrixError> {
        crate::orient::orientation_transform(self, orientation)
    }

    /// Replace the pixel rectangle wholesale (dimensions must match).
    pub(crate) fn copy_rows_from(&mut self, src: &PixelSlice<'_>) -> Result<(), MatrixError> {
        if src.width != self.width || src.height != self.height {
            return Err(MatrixError::OutOfBounds);
        }
        if src.pixel != self.pixel {
            return Err(MatrixError::ChannelMismatch {
                src: src.pixel.channels(),
                dst: self.pixel.channels(),
            });
        }
        for y in 0..self.height {
            self.row_mut(y).copy_from_slice(src.row(y));
        }
        Ok(())
    }

    pub(crate) fn replace_owned(
        &mut self,
        data: Vec<u8>,
        width: u32,
        height: u32,
    ) -> Result<(), MatrixError> {
        let stride = width as usize * self.pixel.bytes_per_pixel();
        let needed = stride * height as usize;
        debug_assert_eq!(data.len(), needed);
        match &mut self.storage {
            Storage::Owned(v) => {
                *v = data;
                self.width = width;
                self.height = height;
                self.stride = stride;
                Ok(())
            }
            Storage::Wrapped(buf) => {
                if needed > buf.len() {
                    return Err(MatrixError::BufferTooSmall {
                        needed,
                        actual: buf.len(),
                    });
                }
                buf[..needed].copy_from_slice(&data);
                self.width = width;
                self.height = height;
                self.stride = stride;
                Ok(())
            }
        }
    }
}

/// Borrowed read-only rectangle of pixels.
///
/// Produced by [`PixelMatrix::crop`] and [`PixelMatrix::as_slice`]; this is
/// what encoders and the region composer consume.
#[derive(Clone, Copy)]
pub struct PixelSlice<'a> {
    data: &'a [u8],
    width: u32,
    height: u32,
    stride: usize,
    pixel: PixelType,
}

impl<'a> PixelSlice<'a> {
    /// Describe a foreign byte buffer as a pixel rectangle.
    pub fn new(
        data: &'a [u8],
        width: u32,
        height: u32,
        stride: usize,
        pixel: PixelType,
    ) -> Result<Self, MatrixError> {
        let min = width as usize * pixel.bytes_per_pixel();
        if stride < min {
            return Err(MatrixError::InvalidStride { stride, width });
        }
        let needed = if height == 0 {
            0
        } else {
            (height as usize - 1) * stride + min
        };
        if needed > data.len() {
            return Err(MatrixError::BufferTooSmall {
                needed,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
            pixel,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel
    }

    /// The underlying bytes covered by this view.
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// One row of pixels (`width * bytes_per_pixel` bytes).
    pub fn row(&self, y: u32) -> &'a [u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * self.pixel.bytes_per_pixel()]
    }

    /// Sub-rectangle view sharing the same backing bytes.
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Result<PixelSlice<'a>, MatrixError> {
        let (x2, y2) = (
            x.checked_add(w).ok_or(MatrixError::OutOfBounds)?,
            y.checked_add(h).ok_or(MatrixError::OutOfBounds)?,
        );
        if x2 > self.width || y2 > self.height {
            return Err(MatrixError::OutOfBounds);
        }
        let bpp = self.pixel.bytes_per_pixel();
        let offset = y as usize * self.stride + x as usize * bpp;
        let len = if h == 0 {
            0
        } else {
            (h as usize - 1) * self.stride + w as usize * bpp
        };
        Ok(PixelSlice {
            data: &self.data[offset..offset + len],
            width: w,
            height: h,
            stride: self.stride,
            pixel: self.pixel,
        })
    }

    /// Copy the rectangle into a freshly allocated contiguous buffer.
    pub fn to_contiguous(&self) -> Vec<u8> {
        let row_len = self.width as usize * self.pixel.bytes_per_pixel();
        let mut out = Vec::with_capacity(row_len * self.height as usize);
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }
}

/// Borrowed mutable rectangle of pixels.
pub struct PixelSliceMut<'a> {
    data: &'a mut [u8],
    width: u32,
    height: u32,
    stride: usize,
    pixel: PixelType,
}

impl<'a> PixelSliceMut<'a> {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn pixel_type(&self) -> PixelType {
        self.pixel
    }

    /// One row of pixels.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * self.pixel.bytes_per_pixel()]
    }

    /// One mutable row of pixels.
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = y as usize * self.stride;
        let len = self.width as usize * self.pixel.bytes_per_pixel();
        &mut self.data[start..start + len]
    }

    /// Reborrow as read-only.
    pub fn as_ref(&self) -> PixelSlice<'_> {
        PixelSlice {
            data: self.data,
            width: self.width,
            height: self.height,
            stride: self.stride,
            pixel: self.pixel,
        }
    }

    fn into_crop(self, x: u32, y: u32, w: u32, h: u32) -> Result<PixelSliceMut<'a>, MatrixError> {
        let (x2, y2) = (
            x.checked_add(w).ok_or(MatrixError::OutOfBounds)?,
            y.checked_add(h).ok_or(MatrixError::OutOfBounds)?,
        );
        if x2 > self.width || y2 > self.height {
            return Err(MatrixError::OutOfBounds);
        }
        let bpp = self.pixel.bytes_per_pixel();
        let offset = y as usize * self.stride + x as usize * bpp;
        let len = if h == 0 {
            0
        } else {
            (h as usize - 1) * self.stride + w as usize * bpp
        };
        Ok(PixelSliceMut {
            data: &mut self.data[offset..offset + len],
            width: w,
            height: h,
            stride: self.stride,
            pixel: self.pixel,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_matrix_is_zeroed() {
        let m = PixelMatrix::new(3, 2, PixelType::Bgr8).unwrap();
        assert_eq!(m.stride(), 9);
        assert!(m.bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn from_buf_rejects_short_buffer() {
        let mut buf = [0u8; 11];
        let err = PixelMatrix::from_buf(2, 2, PixelType::Bgr8, &mut buf).unwrap_err();
        assert!(matches!(err, MatrixError::BufferTooSmall { needed: 12, .. }));
    }

    #[test]
    fn from_buf_capacity_invariant() {
        let mut buf = [0u8; 64];
        let m = PixelMatrix::from_buf(2, 2, PixelType::Bgra8, &mut buf).unwrap();
        assert!(m.width() as usize * m.height() as usize * m.pixel_type().bytes_per_pixel()
            <= m.capacity());
        assert_eq!(m.capacity(), 64);
    }

    #[test]
    fn stride_rules() {
        let mut buf = [0u8; 64];
        let mut m = PixelMatrix::from_buf(2, 2, PixelType::Bgra8, &mut buf).unwrap();
        // below minimum
        assert!(m.set_row_stride(4).is_err());
        // fits capacity
        m.set_row_stride(16).unwrap();
        assert_eq!(m.stride(), 16);
        // second change is refused: stride is no longer minimal
        assert!(m.set_row_stride(24).is_err());
        // exceeding capacity is refused up front
        let mut buf2 = [0u8; 20];
        let mut m2 = PixelMatrix::from_buf(2, 2, PixelType::Bgra8, &mut buf2).unwrap();
        assert!(m2.set_row_stride(16).is_err());
    }

    #[test]
    fn crop_is_strict_subset() {
        let mut m = PixelMatrix::new(4, 4, PixelType::Bgra8).unwrap();
        m.set_fill(1, 2, 3, 4);
        let view = m.crop(1, 1, 2, 2).unwrap();
        assert_eq!(view.width(), 2);
        assert_eq!(view.height(), 2);
        assert_eq!(view.stride(), m.stride());
        assert!(view.bytes().len() < m.bytes().len());
        assert_eq!(view.row(0), &[3, 2, 1, 4, 3, 2, 1, 4]);
    }

    #[test]
    fn crop_out_of_bounds() {
        let m = PixelMatrix::new(4, 4, PixelType::Bgr8).unwrap();
        assert!(matches!(m.crop(3, 0, 2, 1), Err(MatrixError::OutOfBounds)));
        assert!(matches!(m.crop(0, 4, 1, 1), Err(MatrixError::OutOfBounds)));
    }

    #[test]
    fn empty_sink_claims_bytes() {
        let mut buf = [0u8; 48];
        let mut m = PixelMatrix::empty_from_buf(&mut buf);
        assert_eq!(m.height(), 0);
        m.assume_filled(4, 4, PixelType::Bgr8).unwrap();
        assert_eq!((m.width(), m.height()), (4, 4));
        assert!(m.assume_filled(8, 8, PixelType::Bgr8).is_err());
    }

    #[test]
    fn fill_ignores_alpha_for_bgr() {
        let mut m = PixelMatrix::new(2, 1, PixelType::Bgr8).unwrap();
        m.set_fill(10, 20, 30, 99);
        assert_eq!(m.row(0), &[30, 20, 10, 30, 20, 10]);
        m.reset();
        assert_eq!(m.row(0), &[0; 6]);
    }
}
