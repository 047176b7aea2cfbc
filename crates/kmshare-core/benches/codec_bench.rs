//! Criterion benchmarks for the event codec hot path.
//!
//! Pointer motion dominates session traffic – a 1000 Hz gaming mouse emits
//! an encode and a decode per report – so `mouse_move` is the frame that
//! matters.  Keyboard frames are benched as the stringly-keyed worst case.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kmshare_core::{encode_event, Event, KeyId, LineDecoder, SpecialKey};

fn bench_encode(c: &mut Criterion) {
    let mouse_move = Event::MouseMove { x: 1919, y: 1079 };
    let keyboard = Event::Keyboard {
        key: KeyId::Special(SpecialKey::Shift),
        pressed: true,
    };

    c.bench_function("encode_mouse_move", |b| {
        b.iter(|| encode_event(black_box(&mouse_move)).expect("encode"))
    });
    c.bench_function("encode_keyboard", |b| {
        b.iter(|| encode_event(black_box(&keyboard)).expect("encode"))
    });
}

fn bench_decode(c: &mut Criterion) {
    let frame = encode_event(&Event::MouseMove { x: 1919, y: 1079 }).expect("encode");

    c.bench_function("decode_mouse_move", |b| {
        b.iter(|| {
            let mut decoder = LineDecoder::new();
            decoder.extend(black_box(&frame));
            decoder.next_frame().expect("frame").expect("valid")
        })
    });

    // A full 64-frame burst through one decoder, mimicking a large recv.
    let mut burst = Vec::new();
    for i in 0..64 {
        burst.extend(encode_event(&Event::MouseMove { x: i, y: i }).expect("encode"));
    }
    c.bench_function("decode_burst_64", |b| {
        b.iter(|| {
            let mut decoder = LineDecoder::new();
            decoder.extend(black_box(&burst));
            let mut count = 0;
            while let Some(result) = decoder.next_frame() {
                result.expect("valid");
                count += 1;
            }
            count
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
