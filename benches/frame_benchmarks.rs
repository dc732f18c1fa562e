// ABOUTME: Benchmarks for frame encode/decode over a range of IP packet sizes

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use packetforward::frame::{FramedConfig, FramedReader, FramedWriter};
use std::io::Cursor;
use tokio::runtime::Runtime;

fn encode_frame(config: &FramedConfig, payload: &[u8]) -> Vec<u8> {
    let rt = Runtime::new().unwrap();
    rt.block_on(async {
        let mut writer = FramedWriter::new(Vec::new(), config);
        writer.write_frame(payload).await.unwrap();
        writer.into_inner()
    })
}

fn bench_write_frame(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let config = FramedConfig::default();
    let mut group = c.benchmark_group("write_frame");

    for &size in &[64usize, 512, 1500, 9000, 65000] {
        let payload = vec![0xABu8; size];
        group.bench_with_input(BenchmarkId::new("payload_bytes", size), &payload, |b, payload| {
            b.iter(|| {
                rt.block_on(async {
                    let mut writer = FramedWriter::new(Vec::new(), &config);
                    writer.write_frame(black_box(payload)).await.unwrap();
                    writer.into_inner()
                })
            })
        });
    }

    group.finish();
}

fn bench_read_frame(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let config = FramedConfig::default();
    let mut group = c.benchmark_group("read_frame");

    for &size in &[64usize, 512, 1500, 9000, 65000] {
        let payload = vec![0xCDu8; size];
        let encoded = encode_frame(&config, &payload);

        group.bench_with_input(BenchmarkId::new("payload_bytes", size), &encoded, |b, encoded| {
            b.iter(|| {
                rt.block_on(async {
                    let cursor = Cursor::new(black_box(encoded.as_slice()));
                    let mut reader = FramedReader::new(cursor, &config);
                    reader.read_frame().await.unwrap().unwrap()
                })
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_write_frame, bench_read_frame);
criterion_main!(benches);
