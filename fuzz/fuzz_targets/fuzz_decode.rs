#![no_main]
use framecodec::{AnyDecoder, Limits, PixelMatrix};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic. Limits keep the fuzzer
    // from spending its budget on huge canvases.
    let limits = Limits {
        max_pixels: Some(1 << 20),
        max_memory_bytes: Some(64 << 20),
        ..Limits::default()
    };
    let Ok(mut decoder) = AnyDecoder::with_limits(data, &limits) else {
        return;
    };
    let Ok(mut canvas) = PixelMatrix::new(decoder.width(), decoder.height(), decoder.pixel_type())
    else {
        return;
    };
    // Bound the frame walk: corrupt frame counts must not loop forever.
    for _ in 0..64 {
        if !decoder.has_more_frames() || decoder.decode_into(&mut canvas).is_err() {
            break;
        }
    }
});
