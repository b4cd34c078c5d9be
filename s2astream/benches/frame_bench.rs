// S2AStream benchmarks using criterion.
//
// Measures:
//   - Frame encode / decode throughput
//   - Length-prefixed codec round trip

use bytes::{Bytes, BytesMut};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use s2astream::{Frame, FrameCodec};
use tokio_util::codec::{Decoder, Encoder};

const SIZES: &[usize] = &[64, 1024, 8192, 65536];

// ---------------------------------------------------------------------------
// Frame encode throughput
// ---------------------------------------------------------------------------

fn bench_frame_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encode");
    for &size in SIZES {
        let frame = Frame::Data {
            stream_id: 1,
            payload: Bytes::from(vec![0xABu8; size]),
        };
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{size}B")),
            &frame,
            |b, f| b.iter(|| black_box(f.encode())),
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Frame decode throughput
// ---------------------------------------------------------------------------

fn bench_frame_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decode");
    for &size in SIZES {
        let encoded = Frame::Data {
            stream_id: 1,
            payload: Bytes::from(vec![0xABu8; size]),
        }
        .encode();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{size}B")),
            &encoded,
            |b, data| b.iter(|| black_box(Frame::decode(data).unwrap())),
        );
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Codec round trip
// ---------------------------------------------------------------------------

fn bench_codec(c: &mut Criterion) {
    c.bench_function("codec_encode_decode_1KiB", |b| {
        let mut codec = FrameCodec::new();
        let payload = Bytes::from(vec![0x5Au8; 1024]);
        let mut buf = BytesMut::with_capacity(2048);
        b.iter(|| {
            codec
                .encode(
                    Frame::Data {
                        stream_id: 7,
                        payload: payload.clone(),
                    },
                    &mut buf,
                )
                .unwrap();
            black_box(codec.decode(&mut buf).unwrap());
        });
    });
}

criterion_group!(benches, bench_frame_encode, bench_frame_decode, bench_codec);
criterion_main!(benches);
