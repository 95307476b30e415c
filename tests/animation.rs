use framecodec::*;

fn bgra_canvas(w: u32, h: u32, b: u8, g: u8, r: u8, a: u8) -> PixelMatrix<'static> {
    let mut m = PixelMatrix::new(w, h, PixelType::Bgra8).unwrap();
    m.set_fill(r, g, b, a);
    m
}

fn put_pixel(m: &mut PixelMatrix<'_>, x: u32, y: u32, px: [u8; 4]) {
    let x = x as usize;
    m.row_mut(y)[x * 4..x * 4 + 4].copy_from_slice(&px);
}

fn pixel(m: &PixelMatrix<'_>, x: u32, y: u32) -> [u8; 4] {
    let x = x as usize;
    m.row(y)[x * 4..x * 4 + 4].try_into().unwrap()
}

// ── APNG ─────────────────────────────────────────────────────────────

#[test]
fn apng_minimal_diff_emits_single_pixel_rect() {
    const RED: [u8; 4] = [0, 0, 255, 255];
    const BLUE: [u8; 4] = [255, 0, 0, 255];

    let frame0 = bgra_canvas(10, 10, 0, 0, 255, 255);
    let mut frame1 = bgra_canvas(10, 10, 0, 0, 255, 255);
    put_pixel(&mut frame1, 5, 5, BLUE);

    let mut buf = vec![0u8; 8 << 10];
    let mut enc = ApngEncoder::new(&mut buf, 10, 10, 2).unwrap();
    enc.encode_frame(frame0.as_slice(), 100).unwrap();
    enc.encode_frame(frame1.as_slice(), 100).unwrap();
    let n = enc.flush().unwrap();
    drop(enc);

    let mut dec = PngDecoder::new(&buf[..n]).unwrap();
    assert!(dec.is_animated());
    assert_eq!(dec.frame_count(), 2);

    let mut canvas = PixelMatrix::new(10, 10, PixelType::Bgra8).unwrap();
    dec.decode_into(&mut canvas).unwrap();
    assert_eq!(pixel(&canvas, 5, 5), RED);

    dec.decode_into(&mut canvas).unwrap();
    // The second frame's sub-rectangle collapses to the changed pixel.
    let fh = dec.frame_header();
    assert_eq!((fh.x_offset, fh.y_offset), (5, 5));
    assert_eq!((fh.width, fh.height), (1, 1));
    assert_eq!(fh.dispose, Dispose::None);
    assert_eq!(fh.blend, Blend::Over);
    assert_eq!(fh.duration_ms, 100);

    assert_eq!(pixel(&canvas, 5, 5), BLUE);
    for y in 0..10 {
        for x in 0..10 {
            if (x, y) != (5, 5) {
                assert_eq!(pixel(&canvas, x, y), RED, "pixel ({x},{y})");
            }
        }
    }
}

#[test]
fn apng_frame_count_and_delays_round_trip() {
    let mut buf = vec![0u8; 16 << 10];
    let mut enc = ApngEncoder::new(&mut buf, 4, 4, 3).unwrap();
    for (i, delay) in [40u32, 80, 120].iter().enumerate() {
        let shade = (i as u8 + 1) * 60;
        let frame = bgra_canvas(4, 4, shade, shade, shade, 255);
        enc.encode_frame(frame.as_slice(), *delay).unwrap();
    }
    let n = enc.flush().unwrap();
    drop(enc);

    let mut dec = PngDecoder::new(&buf[..n]).unwrap();
    assert_eq!(dec.frame_count(), 3);
    let mut canvas = PixelMatrix::new(4, 4, PixelType::Bgra8).unwrap();
    let mut delays = Vec::new();
    while dec.has_more_frames() {
        dec.decode_into(&mut canvas).unwrap();
        delays.push(dec.frame_header().duration_ms);
    }
    assert_eq!(delays, vec![40, 80, 120]);
    assert!(matches!(
        dec.decode_into(&mut canvas),
        Err(DecodeError::Eof)
    ));
}

#[test]
fn apng_canvas_dimensions_never_change() {
    let mut buf = vec![0u8; 8 << 10];
    let mut enc = ApngEncoder::new(&mut buf, 6, 5, 2).unwrap();
    let f0 = bgra_canvas(6, 5, 10, 10, 10, 255);
    let mut f1 = bgra_canvas(6, 5, 10, 10, 10, 255);
    put_pixel(&mut f1, 2, 2, [9, 9, 9, 255]);
    enc.encode_frame(f0.as_slice(), 50).unwrap();
    enc.encode_frame(f1.as_slice(), 50).unwrap();
    let n = enc.flush().unwrap();
    drop(enc);

    let mut dec = PngDecoder::new(&buf[..n]).unwrap();
    let header = dec.header().clone();
    assert_eq!((header.canvas_width, header.canvas_height), (6, 5));
    // A canvas-sized output is required even for the 1x1 second frame.
    let mut small = PixelMatrix::new(1, 1, PixelType::Bgra8).unwrap();
    assert!(matches!(
        dec.decode_into(&mut small),
        Err(DecodeError::MatrixTooSmall { .. })
    ));
}

// ── GIF ──────────────────────────────────────────────────────────────

#[test]
fn gif_animation_round_trip() {
    let mut buf = vec![0u8; 64 << 10];
    let mut enc = GifEncoder::new(&mut buf, 8, 8, 5).unwrap();
    let red = bgra_canvas(8, 8, 0, 0, 255, 255);
    let blue = bgra_canvas(8, 8, 255, 0, 0, 255);
    enc.write_frame(red.as_slice(), FrameParams::with_delay(100))
        .unwrap();
    enc.write_frame(blue.as_slice(), FrameParams::with_delay(200))
        .unwrap();
    let n = enc.flush().unwrap();
    drop(enc);

    let mut dec = GifDecoder::new(&buf[..n]).unwrap();
    assert_eq!(dec.frame_count(), 2);
    assert_eq!(dec.loop_count(), 5);
    assert_eq!(dec.header().total_duration_ms, 300);

    let mut canvas = PixelMatrix::new(8, 8, PixelType::Bgra8).unwrap();
    dec.decode_into(&mut canvas).unwrap();
    assert_eq!(dec.frame_header().duration_ms, 100);
    let px = pixel(&canvas, 4, 4);
    assert!(px[2] > 200 && px[0] < 60, "expected red, got {px:?}");

    dec.decode_into(&mut canvas).unwrap();
    assert_eq!(dec.frame_header().duration_ms, 200);
    let px = pixel(&canvas, 4, 4);
    assert!(px[0] > 200 && px[2] < 60, "expected blue, got {px:?}");

    assert!(!dec.has_more_frames());
}

#[test]
fn gif_dispose_previous_restores_canvas() {
    // Frame 0 paints red with dispose=Previous, frame 1 paints a small
    // blue square with dispose=None, frame 2 paints nothing. The final
    // canvas must contain only the blue square.
    let mut buf = vec![0u8; 64 << 10];
    let mut enc = GifEncoder::new(&mut buf, 8, 8, 0).unwrap();

    let red = bgra_canvas(8, 8, 0, 0, 255, 255);
    enc.write_frame(
        red.as_slice(),
        FrameParams {
            delay_ms: 100,
            dispose: Dispose::Previous,
            ..FrameParams::default()
        },
    )
    .unwrap();

    let mut blue_square = bgra_canvas(8, 8, 0, 0, 0, 0);
    for y in 2..4 {
        for x in 2..4 {
            put_pixel(&mut blue_square, x, y, [255, 0, 0, 255]);
        }
    }
    enc.write_frame(
        blue_square.as_slice(),
        FrameParams {
            delay_ms: 100,
            dispose: Dispose::None,
            ..FrameParams::default()
        },
    )
    .unwrap();

    let transparent = bgra_canvas(8, 8, 0, 0, 0, 0);
    enc.write_frame(transparent.as_slice(), FrameParams::with_delay(100))
        .unwrap();
    let n = enc.flush().unwrap();
    drop(enc);

    let mut dec = GifDecoder::new(&buf[..n]).unwrap();
    let mut canvas = PixelMatrix::new(8, 8, PixelType::Bgra8).unwrap();
    dec.decode_into(&mut canvas).unwrap(); // red everywhere
    assert!(pixel(&canvas, 6, 6)[2] > 200);
    dec.decode_into(&mut canvas).unwrap(); // red restored away, blue square
    dec.decode_into(&mut canvas).unwrap(); // unchanged
    let inside = pixel(&canvas, 2, 2);
    assert!(inside[0] > 200 && inside[3] == 255, "got {inside:?}");
    let outside = pixel(&canvas, 6, 6);
    assert_eq!(outside[3], 0, "outside must be transparent, got {outside:?}");
}

#[test]
fn gif_netscape_loop_infinite() {
    let mut buf = vec![0u8; 16 << 10];
    let mut enc = GifEncoder::new(&mut buf, 4, 4, 0).unwrap();
    let f = bgra_canvas(4, 4, 128, 128, 128, 255);
    enc.write_frame(f.as_slice(), FrameParams::with_delay(50))
        .unwrap();
    let n = enc.flush().unwrap();
    drop(enc);
    let dec = GifDecoder::new(&buf[..n]).unwrap();
    assert_eq!(dec.loop_count(), 0);
}

// ── WebP ─────────────────────────────────────────────────────────────

#[test]
fn webp_first_frame_upgrade() {
    let frame_a = bgra_canvas(6, 6, 0, 128, 255, 255);
    let frame_b = bgra_canvas(6, 6, 255, 128, 0, 255);

    let mut buf = vec![0u8; 64 << 10];
    let mut enc = WebpEncoder::new(&mut buf, None, 0xFFFF_FFFF, 2);
    enc.write(frame_a.as_slice(), &[], FrameParams::with_delay(100))
        .unwrap();
    enc.write(frame_b.as_slice(), &[], FrameParams::with_delay(200))
        .unwrap();
    let n = enc.flush().unwrap();

    let mut dec = WebpDecoder::new(&buf[..n]).unwrap();
    assert!(dec.is_animated());
    assert_eq!(dec.frame_count(), 2);
    assert_eq!(dec.loop_count(), 2);
    assert_eq!(dec.total_duration_ms(), 300);

    let mut canvas = PixelMatrix::new(6, 6, dec.pixel_type()).unwrap();
    dec.decode_into(&mut canvas).unwrap();
    assert_eq!(dec.frame_header().duration_ms, 100);
    let bpp = dec.pixel_type().bytes_per_pixel();
    assert_eq!(&canvas.row(0)[..3], &frame_a.row(0)[..3]);
    assert_eq!(&canvas.row(0)[..bpp], &frame_a.row(0)[..bpp]);

    assert!(dec.has_more_frames());
    dec.decode_into(&mut canvas).unwrap();
    assert_eq!(dec.frame_header().duration_ms, 200);
    assert_eq!(&canvas.row(0)[..3], &frame_b.row(0)[..3]);
    assert!(!dec.has_more_frames());
}

#[test]
fn webp_skip_frame_advances_cursor() {
    let frame_a = bgra_canvas(4, 4, 1, 2, 3, 255);
    let frame_b = bgra_canvas(4, 4, 200, 100, 50, 255);
    let mut buf = vec![0u8; 64 << 10];
    let mut enc = WebpEncoder::new(&mut buf, None, 0, 0);
    enc.write(frame_a.as_slice(), &[], FrameParams::with_delay(10))
        .unwrap();
    enc.write(frame_b.as_slice(), &[], FrameParams::with_delay(20))
        .unwrap();
    let n = enc.flush().unwrap();

    let mut dec = WebpDecoder::new(&buf[..n]).unwrap();
    dec.skip_frame().unwrap();
    let mut canvas = PixelMatrix::new(4, 4, dec.pixel_type()).unwrap();
    dec.decode_into(&mut canvas).unwrap();
    assert_eq!(&canvas.row(0)[..3], &frame_b.row(0)[..3]);
    assert!(matches!(dec.skip_frame(), Err(DecodeError::Eof)));
}

// ── Cross-cutting ────────────────────────────────────────────────────

#[test]
fn animated_encoders_reject_empty_flush() {
    let mut buf = vec![0u8; 4096];
    assert_eq!(
        ApngEncoder::new(&mut buf, 4, 4, 1)
            .unwrap()
            .flush()
            .unwrap_err()
            .code(),
        5
    );
    assert_eq!(
        GifEncoder::new(&mut buf, 4, 4, 0)
            .unwrap()
            .flush()
            .unwrap_err()
            .code(),
        5
    );
    assert_eq!(
        WebpEncoder::new(&mut buf, None, 0, 0)
            .flush()
            .unwrap_err()
            .code(),
        5
    );
}

#[test]
fn finalized_encoders_reject_reuse() {
    let frame = bgra_canvas(4, 4, 1, 1, 1, 255);
    let mut buf = vec![0u8; 64 << 10];
    let mut enc = WebpEncoder::new(&mut buf, None, 0, 0);
    enc.write(frame.as_slice(), &[], FrameParams::default())
        .unwrap();
    enc.flush().unwrap();
    assert!(enc
        .write(frame.as_slice(), &[], FrameParams::default())
        .is_err());
    assert!(enc.flush().is_err());
}
