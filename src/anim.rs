//! Frame and animation metadata shared by every animated format.

/// Canvas action applied after a frame is displayed, before the next frame
/// is composited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Dispose {
    /// Leave the canvas as-is.
    #[default]
    None,
    /// Clear the frame's region to the canvas background.
    Background,
    /// Restore the canvas to its state before the frame was rendered.
    Previous,
}

/// How a frame's sub-image is composited onto the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Blend {
    /// Alpha-composite over the existing canvas.
    #[default]
    Over,
    /// Replace the region outright.
    Source,
}

/// Read-only metadata of a decoded frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameHeader {
    /// Display duration in milliseconds.
    pub duration_ms: u32,
    /// Horizontal offset of the sub-image into the canvas.
    pub x_offset: u32,
    /// Vertical offset of the sub-image into the canvas.
    pub y_offset: u32,
    /// Sub-image width.
    pub width: u32,
    /// Sub-image height.
    pub height: u32,
    pub dispose: Dispose,
    pub blend: Blend,
}

/// Stream-level metadata exposed by every decoder after header parse.
///
/// Stills report one frame, zero duration, and an infinite-loop count of
/// zero, so callers can treat the formats uniformly.
#[derive(Clone, Debug, Default)]
pub struct AnimationHeader {
    /// Canvas width in pixels.
    pub canvas_width: u32,
    /// Canvas height in pixels.
    pub canvas_height: u32,
    /// Total number of frames.
    pub frame_count: u32,
    /// `0` means loop forever; `N` plays the animation `N + 1` times.
    pub loop_count: u32,
    /// Sum of all frame durations in milliseconds (zero for stills).
    pub total_duration_ms: u32,
    /// Background color as `0xRRGGBBAA`.
    pub bg_color: u32,
    /// Embedded ICC profile, if any.
    pub icc: Option<Vec<u8>>,
    /// Embedded XMP metadata, if any.
    pub xmp: Option<Vec<u8>>,
}

impl AnimationHeader {
    /// Copy the ICC profile into `buf`, returning the number of bytes
    /// copied (zero when absent or when `buf` is too small).
    pub fn icc_into(&self, buf: &mut [u8]) -> usize {
        copy_opt(self.icc.as_deref(), buf)
    }

    /// Copy the XMP bytes into `buf`; same convention as [`icc_into`](Self::icc_into).
    pub fn xmp_into(&self, buf: &mut [u8]) -> usize {
        copy_opt(self.xmp.as_deref(), buf)
    }
}

fn copy_opt(src: Option<&[u8]>, buf: &mut [u8]) -> usize {
    match src {
        Some(data) if !data.is_empty() && data.len() <= buf.len() => {
            buf[..data.len()].copy_from_slice(data);
            data.len()
        }
        _ => 0,
    }
}

/// Per-frame parameters handed to animated encoders alongside the pixels.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameParams {
    /// Display duration in milliseconds.
    pub delay_ms: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub dispose: Dispose,
    pub blend: Blend,
}

impl FrameParams {
    /// Frame params carrying only a duration.
    pub fn with_delay(delay_ms: u32) -> Self {
        Self {
            delay_ms,
            ..Self::default()
        }
    }
}
