//! Encoder options, passed as `(key, value)` pairs.

/// Option keys recognized by the encoders.
///
/// Each encoder reads the keys that apply to it and ignores the rest;
/// values are clamped to their documented ranges.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionKey {
    /// JPEG quality, 1-100 (default 95).
    Quality,
    /// JPEG progressive flag, 0 or 1 (default 0).
    Progressive,
    /// PNG compression, 0-9 (default 6).
    Compression,
    /// WebP quality: 0-100 selects lossy quality, above 100 lossless.
    WebpQuality,
    /// AVIF quality, 0-100.
    AvifQuality,
    /// AVIF encoder speed, 0-10.
    AvifSpeed,
}

/// A `(key, value)` option pair.
pub type EncodeOption = (OptionKey, i64);

/// Last-one-wins lookup of `key` in an option list.
pub(crate) fn lookup(opts: &[EncodeOption], key: OptionKey) -> Option<i64> {
    opts.iter()
        .rev()
        .find(|(k, _)| *k == key)
        .map(|&(_, v)| v)
}

/// Look up `key` and clamp it into `[lo, hi]`, falling back to `default`.
pub(crate) fn lookup_clamped(
    opts: &[EncodeOption],
    key: OptionKey,
    lo: i64,
    hi: i64,
    default: i64,
) -> i64 {
    lookup(opts, key).map_or(default, |v| v.clamp(lo, hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_pairs_win_and_values_clamp() {
        let opts = [(OptionKey::Quality, 150), (OptionKey::Quality, -3)];
        assert_eq!(lookup(&opts, OptionKey::Quality), Some(-3));
        assert_eq!(lookup_clamped(&opts, OptionKey::Quality, 1, 100, 95), 1);
        assert_eq!(lookup_clamped(&[], OptionKey::Quality, 1, 100, 95), 95);
    }
}
