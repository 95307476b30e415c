/// Image format detected from magic bytes.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// JPEG (JFIF/EXIF, baseline and progressive).
    Jpeg,
    /// PNG, including the APNG animation extension.
    Png,
    /// GIF87a / GIF89a.
    Gif,
    /// WebP (VP8/VP8L in RIFF), still or animated.
    Webp,
    /// AVIF (AV1 in HEIF), still or image sequence.
    Avif,
}

/// Pixel memory layout of a [`crate::PixelMatrix`].
///
/// The canonical channel order is BGR/BGRA; every decoder produces it and
/// every encoder consumes it.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelType {
    /// Single channel, 8-bit grayscale.
    Gray8,
    /// 3 channels, 8-bit BGR.
    Bgr8,
    /// 4 channels, 8-bit BGRA.
    Bgra8,
}

impl PixelType {
    /// Bytes per pixel for this layout.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Bgr8 => 3,
            Self::Bgra8 => 4,
        }
    }

    /// Number of channels.
    pub fn channels(&self) -> u8 {
        match self {
            Self::Gray8 => 1,
            Self::Bgr8 => 3,
            Self::Bgra8 => 4,
        }
    }

    /// Whether the layout carries an alpha channel.
    pub fn has_alpha(&self) -> bool {
        matches!(self, Self::Bgra8)
    }

    pub(crate) fn from_channels(channels: u8) -> Option<Self> {
        match channels {
            1 => Some(Self::Gray8),
            3 => Some(Self::Bgr8),
            4 => Some(Self::Bgra8),
            _ => None,
        }
    }
}
