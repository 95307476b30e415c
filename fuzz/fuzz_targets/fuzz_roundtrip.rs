#![no_main]
use framecodec::{PixelMatrix, PixelSlice, PixelType, PngDecoder, PngEncoder};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Treat the input as raw BGRA pixels; PNG encode/decode must return
    // them bit-exactly.
    if data.len() < 4 {
        return;
    }
    let width = (u32::from(data[0]) % 32) + 1;
    let height = (u32::from(data[1]) % 32) + 1;
    let pixels = &data[2..];
    let needed = width as usize * height as usize * 4;
    if pixels.len() < needed {
        return;
    }
    let Ok(src) = PixelSlice::new(
        &pixels[..needed],
        width,
        height,
        width as usize * 4,
        PixelType::Bgra8,
    ) else {
        return;
    };

    let mut buf = vec![0u8; needed * 2 + 1024];
    let Ok(n) = PngEncoder::new(&mut buf, None).encode(src, &[]) else {
        return;
    };

    let mut decoder = PngDecoder::new(&buf[..n]).expect("encoded PNG failed to parse");
    let mut out = PixelMatrix::new(width, height, PixelType::Bgra8).unwrap();
    decoder.decode_into(&mut out).expect("decode failed");
    for y in 0..height {
        assert_eq!(out.row(y), src.row(y), "roundtrip pixel mismatch");
    }
});
