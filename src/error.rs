/// Errors from decoding any supported format.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("unrecognized format magic bytes")]
    UnrecognizedFormat,

    #[error("truncated input")]
    Truncated,

    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("corrupt frame: {0}")]
    CorruptFrame(String),

    #[error("no more frames")]
    Eof,

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    #[error(
        "destination matrix too small: need {needed_width}x{needed_height}, got {width}x{height}"
    )]
    MatrixTooSmall {
        needed_width: u32,
        needed_height: u32,
        width: u32,
        height: u32,
    },

    #[error("pixel type mismatch: expected {expected:?}, got {actual:?}")]
    PixelTypeMismatch {
        expected: crate::PixelType,
        actual: crate::PixelType,
    },
}

/// Errors from encoding into a caller-supplied buffer.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EncodeError {
    #[error("invalid channel count: {0}")]
    InvalidChannelCount(u8),

    #[error("empty source matrix")]
    EmptyMatrix,

    #[error("invalid dimensions: {width}x{height} stride {stride}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        stride: usize,
    },

    #[error("output buffer too small: need at least {needed} bytes, capacity {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },

    #[error("invalid argument: {0}")]
    InvalidArg(&'static str),

    #[error("encoder failure: {0}")]
    Unknown(String),
}

impl EncodeError {
    /// Integer error code for embedders; `0` is reserved for success.
    pub fn code(&self) -> i32 {
        match self {
            EncodeError::InvalidChannelCount(_) => 1,
            EncodeError::EmptyMatrix => 2,
            EncodeError::InvalidDimensions { .. } => 3,
            EncodeError::BufferTooSmall { .. } => 4,
            EncodeError::InvalidArg(_) => 5,
            EncodeError::Unknown(_) => 6,
        }
    }
}

/// Errors from pixel-matrix and region operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MatrixError {
    #[error("buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("region out of bounds")]
    OutOfBounds,

    #[error("invalid stride {stride} for width {width}")]
    InvalidStride { stride: usize, width: u32 },

    #[error("channel count mismatch: source {src}, destination {dst}")]
    ChannelMismatch { src: u8, dst: u8 },

    #[error("dimensions too large: {width}x{height}")]
    DimensionsTooLarge { width: u32, height: u32 },
}
