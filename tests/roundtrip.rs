use framecodec::*;

/// Max per-channel distance after a lossy JPEG round trip of a uniform
/// image.
const JPEG_DELTA: i16 = 4;

fn bgr_matrix(w: u32, h: u32, b: u8, g: u8, r: u8) -> PixelMatrix<'static> {
    let mut m = PixelMatrix::new(w, h, PixelType::Bgr8).unwrap();
    m.set_fill(r, g, b, 0);
    m
}

#[test]
fn jpeg_encode_sanity() {
    let src = bgr_matrix(4, 4, 0, 128, 255);
    let mut buf = [0u8; 1024];
    let mut enc = JpegEncoder::new(&mut buf, None);
    let n = enc
        .encode(src.as_slice(), &[(OptionKey::Quality, 90)])
        .unwrap();
    assert!(n > 0);
    assert_eq!(&buf[..2], &[0xFF, 0xD8]);

    let mut dec = JpegDecoder::new(&buf[..n]).unwrap();
    assert_eq!((dec.width(), dec.height()), (4, 4));
    assert_eq!(dec.pixel_type(), PixelType::Bgr8);
    let mut out = PixelMatrix::new(4, 4, PixelType::Bgr8).unwrap();
    dec.decode_into(&mut out).unwrap();
    for y in 0..4 {
        for (a, b) in out.row(y).iter().zip(src.row(y)) {
            assert!((i16::from(*a) - i16::from(*b)).abs() <= JPEG_DELTA);
        }
    }
}

#[test]
fn jpeg_second_decode_is_eof() {
    let src = bgr_matrix(4, 4, 10, 20, 30);
    let mut buf = [0u8; 1024];
    let n = JpegEncoder::new(&mut buf, None)
        .encode(src.as_slice(), &[])
        .unwrap();
    let mut dec = JpegDecoder::new(&buf[..n]).unwrap();
    let mut out = PixelMatrix::new(4, 4, PixelType::Bgr8).unwrap();
    assert!(dec.has_more_frames());
    dec.decode_into(&mut out).unwrap();
    assert!(!dec.has_more_frames());
    assert!(matches!(dec.decode_into(&mut out), Err(DecodeError::Eof)));
}

#[test]
fn jpeg_grayscale_roundtrip() {
    let mut src = PixelMatrix::new(8, 8, PixelType::Gray8).unwrap();
    src.set_fill(200, 0, 0, 0);
    let mut buf = [0u8; 2048];
    let n = JpegEncoder::new(&mut buf, None)
        .encode(src.as_slice(), &[(OptionKey::Quality, 95)])
        .unwrap();
    let mut dec = JpegDecoder::new(&buf[..n]).unwrap();
    assert_eq!(dec.pixel_type(), PixelType::Gray8);
    let mut out = PixelMatrix::new(8, 8, PixelType::Gray8).unwrap();
    dec.decode_into(&mut out).unwrap();
    for (a, b) in out.row(0).iter().zip(src.row(0)) {
        assert!((i16::from(*a) - i16::from(*b)).abs() <= JPEG_DELTA);
    }
}

#[test]
fn jpeg_icc_is_carried() {
    let icc = vec![7u8; 600];
    let src = bgr_matrix(4, 4, 1, 2, 3);
    let mut buf = [0u8; 4096];
    let n = JpegEncoder::new(&mut buf, Some(&icc))
        .encode(src.as_slice(), &[])
        .unwrap();
    let dec = JpegDecoder::new(&buf[..n]).unwrap();
    let mut got = vec![0u8; 1024];
    let len = dec.icc(&mut got);
    assert_eq!(&got[..len], &icc[..]);
    // A short destination copies nothing.
    let mut small = [0u8; 4];
    assert_eq!(dec.icc(&mut small), 0);
}

#[test]
fn png_roundtrip_with_alpha() {
    let mut src = PixelMatrix::new(2, 2, PixelType::Bgra8).unwrap();
    src.row_mut(0)
        .copy_from_slice(&[0, 0, 0, 0, 255, 255, 255, 255]);
    src.row_mut(1)
        .copy_from_slice(&[128, 128, 128, 128, 0, 0, 255, 200]);

    let mut buf = [0u8; 1024];
    let n = PngEncoder::new(&mut buf, None)
        .encode(src.as_slice(), &[(OptionKey::Compression, 6)])
        .unwrap();

    let mut dec = PngDecoder::new(&buf[..n]).unwrap();
    assert_eq!(dec.pixel_type(), PixelType::Bgra8);
    let mut out = PixelMatrix::new(2, 2, PixelType::Bgra8).unwrap();
    dec.decode_into(&mut out).unwrap();
    assert_eq!(out.row(0), src.row(0));
    assert_eq!(out.row(1), src.row(1));
}

#[test]
fn png_roundtrip_is_lossless_at_every_level() {
    let mut src = PixelMatrix::new(3, 2, PixelType::Bgr8).unwrap();
    src.row_mut(0).copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
    src.row_mut(1)
        .copy_from_slice(&[9, 8, 7, 6, 5, 4, 3, 2, 1]);
    for level in [0i64, 6, 9] {
        let mut buf = [0u8; 1024];
        let n = PngEncoder::new(&mut buf, None)
            .encode(src.as_slice(), &[(OptionKey::Compression, level)])
            .unwrap();
        let mut dec = PngDecoder::new(&buf[..n]).unwrap();
        let mut out = PixelMatrix::new(3, 2, PixelType::Bgra8).unwrap();
        dec.decode_into(&mut out).unwrap();
        for y in 0..2 {
            for (o, s) in out.row(y).chunks_exact(4).zip(src.row(y).chunks_exact(3)) {
                assert_eq!(&o[..3], s);
                assert_eq!(o[3], 255);
            }
        }
    }
}

#[test]
fn png_icc_is_carried() {
    let icc = vec![42u8; 128];
    let src = bgr_matrix(4, 4, 9, 9, 9);
    let mut buf = [0u8; 4096];
    let n = PngEncoder::new(&mut buf, Some(&icc))
        .encode(src.as_slice(), &[])
        .unwrap();
    let dec = PngDecoder::new(&buf[..n]).unwrap();
    let mut got = vec![0u8; 256];
    let len = dec.icc(&mut got);
    assert_eq!(&got[..len], &icc[..]);
}

#[test]
fn png_capacity_boundary() {
    let src = bgr_matrix(16, 16, 40, 50, 60);
    let mut big = [0u8; 4096];
    let n = PngEncoder::new(&mut big, None)
        .encode(src.as_slice(), &[])
        .unwrap();

    // Exactly the produced size succeeds...
    let mut exact = vec![0u8; n];
    let m = PngEncoder::new(&mut exact, None)
        .encode(src.as_slice(), &[])
        .unwrap();
    assert_eq!(m, n);

    // ...one byte less does not.
    let mut short = vec![0u8; n - 1];
    let err = PngEncoder::new(&mut short, None)
        .encode(src.as_slice(), &[])
        .unwrap_err();
    assert!(matches!(err, EncodeError::BufferTooSmall { .. }));
    assert_eq!(err.code(), 4);
}

#[test]
fn png_rejects_grayscale_source() {
    let mut src = PixelMatrix::new(2, 2, PixelType::Gray8).unwrap();
    src.set_fill(1, 0, 0, 0);
    let mut buf = [0u8; 256];
    let err = PngEncoder::new(&mut buf, None)
        .encode(src.as_slice(), &[])
        .unwrap_err();
    assert_eq!(err.code(), 1);
}

#[test]
fn webp_still_roundtrip() {
    let mut src = PixelMatrix::new(5, 3, PixelType::Bgra8).unwrap();
    src.set_fill(10, 200, 30, 128);
    let mut buf = vec![0u8; 16 << 10];
    let mut enc = WebpEncoder::new(&mut buf, None, 0xFFFF_FFFF, 0);
    enc.write(src.as_slice(), &[], FrameParams::default())
        .unwrap();
    let n = enc.flush().unwrap();

    let mut dec = WebpDecoder::new(&buf[..n]).unwrap();
    assert!(!dec.is_animated());
    assert_eq!((dec.width(), dec.height()), (5, 3));
    assert_eq!(dec.pixel_type(), PixelType::Bgra8);
    let mut out = PixelMatrix::new(5, 3, PixelType::Bgra8).unwrap();
    dec.decode_into(&mut out).unwrap();
    for y in 0..3 {
        assert_eq!(out.row(y), src.row(y));
    }
}

#[test]
fn webp_icc_is_carried() {
    let icc = vec![3u8; 64];
    let src = bgr_matrix(4, 4, 5, 6, 7);
    let mut buf = vec![0u8; 16 << 10];
    let mut enc = WebpEncoder::new(&mut buf, Some(&icc), 0xFFFF_FFFF, 0);
    enc.write(src.as_slice(), &[], FrameParams::default())
        .unwrap();
    let n = enc.flush().unwrap();
    let dec = WebpDecoder::new(&buf[..n]).unwrap();
    let mut got = vec![0u8; 128];
    let len = dec.icc(&mut got);
    assert_eq!(&got[..len], &icc[..]);
}

#[test]
fn detect_format_on_encoder_output() {
    let src = bgr_matrix(4, 4, 1, 2, 3);

    let mut jpeg_buf = [0u8; 2048];
    let n = JpegEncoder::new(&mut jpeg_buf, None)
        .encode(src.as_slice(), &[])
        .unwrap();
    assert_eq!(detect_format(&jpeg_buf[..n]), Some(ImageFormat::Jpeg));

    let mut png_buf = [0u8; 2048];
    let n = PngEncoder::new(&mut png_buf, None)
        .encode(src.as_slice(), &[])
        .unwrap();
    assert_eq!(detect_format(&png_buf[..n]), Some(ImageFormat::Png));

    let mut webp_buf = vec![0u8; 16 << 10];
    let mut enc = WebpEncoder::new(&mut webp_buf, None, 0, 0);
    enc.write(src.as_slice(), &[], FrameParams::default())
        .unwrap();
    let n = enc.flush().unwrap();
    assert_eq!(detect_format(&webp_buf[..n]), Some(ImageFormat::Webp));
}

#[test]
fn any_decoder_dispatches_png() {
    let src = bgr_matrix(6, 4, 20, 40, 60);
    let mut buf = [0u8; 2048];
    let n = PngEncoder::new(&mut buf, None)
        .encode(src.as_slice(), &[])
        .unwrap();

    let mut dec = AnyDecoder::new(&buf[..n]).unwrap();
    assert_eq!(dec.format(), ImageFormat::Png);
    assert_eq!((dec.width(), dec.height()), (6, 4));
    assert_eq!(dec.header().frame_count, 1);
    let mut out = PixelMatrix::new(6, 4, dec.pixel_type()).unwrap();
    dec.decode_into(&mut out).unwrap();
    assert!(!dec.has_more_frames());
}

#[test]
fn limits_reject_large_canvas() {
    let src = bgr_matrix(16, 16, 0, 0, 0);
    let mut buf = [0u8; 4096];
    let n = PngEncoder::new(&mut buf, None)
        .encode(src.as_slice(), &[])
        .unwrap();
    let limits = Limits {
        max_pixels: Some(64),
        ..Limits::default()
    };
    let result = PngDecoder::with_limits(&buf[..n], &limits);
    assert!(matches!(result, Err(DecodeError::LimitExceeded(_))));
}

#[test]
fn decode_respects_padded_stride() {
    let mut src = PixelMatrix::new(4, 2, PixelType::Bgra8).unwrap();
    src.set_fill(11, 22, 33, 44);
    let mut buf = [0u8; 1024];
    let n = PngEncoder::new(&mut buf, None)
        .encode(src.as_slice(), &[])
        .unwrap();

    // Destination with a widened row stride.
    let mut backing = [0u8; 256];
    let mut out = PixelMatrix::from_buf(4, 2, PixelType::Bgra8, &mut backing).unwrap();
    out.set_row_stride(24).unwrap();
    let mut dec = PngDecoder::new(&buf[..n]).unwrap();
    dec.decode_into(&mut out).unwrap();
    for y in 0..2 {
        assert_eq!(out.row(y), src.row(y));
    }
}
