//! AVIF round trips. Requires the `avif` feature (system dav1d).

use framecodec::*;

/// Lossy tolerance at the default quality.
const AVIF_DELTA: i16 = 24;

fn bgra_canvas(w: u32, h: u32, b: u8, g: u8, r: u8, a: u8) -> PixelMatrix<'static> {
    let mut m = PixelMatrix::new(w, h, PixelType::Bgra8).unwrap();
    m.set_fill(r, g, b, a);
    m
}

fn assert_close(a: &[u8], b: &[u8]) {
    for (x, y) in a.iter().zip(b) {
        assert!(
            (i16::from(*x) - i16::from(*y)).abs() <= AVIF_DELTA,
            "channel {x} vs {y}"
        );
    }
}

#[test]
fn avif_still_roundtrip() {
    let mut src = PixelMatrix::new(16, 16, PixelType::Bgr8).unwrap();
    src.set_fill(40, 160, 220, 0);

    let mut buf = vec![0u8; 256 << 10];
    let mut enc = AvifEncoder::new(&mut buf, None, None);
    enc.write(
        src.as_slice(),
        &[(OptionKey::AvifQuality, 80), (OptionKey::AvifSpeed, 10)],
        FrameParams::default(),
    )
    .unwrap();
    let n = enc.flush().unwrap();

    assert_eq!(detect_format(&buf[..n]), Some(ImageFormat::Avif));

    let mut dec = AvifDecoder::new(&buf[..n], false).unwrap();
    assert_eq!((dec.width(), dec.height()), (16, 16));
    assert!(!dec.is_animated());
    assert_eq!(dec.pixel_type(), PixelType::Bgr8);

    let mut out = PixelMatrix::new(16, 16, PixelType::Bgr8).unwrap();
    dec.decode_into(&mut out).unwrap();
    assert_close(out.row(8), src.row(8));
    assert!(matches!(dec.decode_into(&mut out), Err(DecodeError::Eof)));
}

#[test]
fn avif_still_with_alpha() {
    let src = bgra_canvas(16, 16, 30, 60, 90, 128);
    let mut buf = vec![0u8; 256 << 10];
    let mut enc = AvifEncoder::new(&mut buf, None, None);
    enc.write(
        src.as_slice(),
        &[(OptionKey::AvifSpeed, 10)],
        FrameParams::default(),
    )
    .unwrap();
    let n = enc.flush().unwrap();

    let mut dec = AvifDecoder::new(&buf[..n], false).unwrap();
    assert_eq!(dec.pixel_type(), PixelType::Bgra8);
    let mut out = PixelMatrix::new(16, 16, PixelType::Bgra8).unwrap();
    dec.decode_into(&mut out).unwrap();
    // Alpha is coded in its own plane and stays close to the input.
    let px = &out.row(8)[32..36];
    assert!((i16::from(px[3]) - 128).abs() <= AVIF_DELTA);
}

#[test]
fn avif_sequence_roundtrip() {
    let frame_a = bgra_canvas(16, 16, 220, 40, 40, 255);
    let frame_b = bgra_canvas(16, 16, 40, 220, 40, 255);

    let mut buf = vec![0u8; 512 << 10];
    let mut enc = AvifEncoder::new(&mut buf, None, None);
    let opts = [(OptionKey::AvifSpeed, 10i64)];
    enc.write(frame_a.as_slice(), &opts, FrameParams::with_delay(100))
        .unwrap();
    enc.write(frame_b.as_slice(), &opts, FrameParams::with_delay(250))
        .unwrap();
    let n = enc.flush().unwrap();

    let mut dec = AvifDecoder::new(&buf[..n], false).unwrap();
    assert!(dec.is_animated());
    assert_eq!(dec.frame_count(), 2);
    assert_eq!(dec.loop_count(), 0);
    assert_eq!(dec.total_duration_ms(), 350);

    let mut out = PixelMatrix::new(16, 16, dec.pixel_type()).unwrap();
    assert_eq!(dec.frame_header().duration_ms, 100);
    dec.decode_into(&mut out).unwrap();
    assert_close(&out.row(8)[..4], &frame_a.row(8)[..4]);

    assert_eq!(dec.frame_header().duration_ms, 250);
    dec.decode_into(&mut out).unwrap();
    assert_close(&out.row(8)[..4], &frame_b.row(8)[..4]);

    assert!(!dec.has_more_frames());
}

#[test]
fn avif_icc_and_xmp_are_carried() {
    let icc = vec![0xAB; 96];
    let xmp = b"<x:xmpmeta xmlns:x=\"adobe:ns:meta/\"/>".to_vec();
    let src = bgra_canvas(8, 8, 10, 20, 30, 255);

    let mut buf = vec![0u8; 256 << 10];
    let mut enc = AvifEncoder::new(&mut buf, Some(&icc), Some(&xmp));
    enc.write(
        src.as_slice(),
        &[(OptionKey::AvifSpeed, 10)],
        FrameParams::default(),
    )
    .unwrap();
    let n = enc.flush().unwrap();

    let dec = AvifDecoder::new(&buf[..n], false).unwrap();
    let mut got_icc = vec![0u8; 256];
    let len = dec.icc(&mut got_icc);
    assert_eq!(&got_icc[..len], &icc[..]);
    let mut got_xmp = vec![0u8; 256];
    let len = dec.xmp(&mut got_xmp);
    assert_eq!(&got_xmp[..len], &xmp[..]);
}

#[test]
fn avif_zero_frame_flush_is_invalid() {
    let mut buf = vec![0u8; 4096];
    let mut enc = AvifEncoder::new(&mut buf, None, None);
    assert_eq!(enc.flush().unwrap_err().code(), 5);
}
