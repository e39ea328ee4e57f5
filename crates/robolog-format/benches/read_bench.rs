//! Recording Codec Benchmarks
//!
//! Measures the hot path of playback: sealing chunks on the write side and
//! opening/decoding them on the read side, with and without compression.
//!
//! ```bash
//! cargo bench -p robolog-format
//! ```

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use robolog_core::Time;
use robolog_format::codec::{
    decode_chunk_records, encode_record, open_chunk_payload, seal_chunk, Compression, RawRecord,
};
use robolog_format::LogWriter;

fn sample_payload(i: u64) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "x": i as f64 * 0.001,
        "y": i as f64 * 0.002,
        "z": 9.81,
        "temp": 20.5,
    }))
    .unwrap()
}

fn build_chunk(record_count: u64) -> (u64, Vec<u8>) {
    let start_time = 1_000_000;
    let mut payload = BytesMut::new();
    let mut prev = start_time;
    for i in 0..record_count {
        let log_time = start_time + i * 1_000;
        let record = RawRecord {
            channel_id: 1,
            log_time,
            publish_time: log_time,
            payload: sample_payload(i).into(),
        };
        encode_record(&mut payload, prev, &record);
        prev = log_time;
    }
    (start_time, payload.to_vec())
}

fn bench_chunk_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_decode");
    for &count in &[1_000u64, 10_000] {
        let (start_time, raw) = build_chunk(count);
        for compression in [Compression::None, Compression::Lz4] {
            let (header, bytes) = seal_chunk(compression, start_time, 0, &raw).unwrap();
            let name = format!("{:?}/{}", compression, count);
            group.throughput(Throughput::Elements(count));
            group.bench_function(BenchmarkId::from_parameter(name), |b| {
                b.iter(|| {
                    let payload = open_chunk_payload(
                        &header,
                        &bytes[robolog_format::codec::CHUNK_HEADER_SIZE..],
                    )
                    .unwrap();
                    let records = decode_chunk_records(&payload, start_time).unwrap();
                    black_box(records.len())
                });
            });
        }
    }
    group.finish();
}

fn bench_writer(c: &mut Criterion) {
    let mut group = c.benchmark_group("writer");
    for &count in &[10_000u64] {
        for compression in [Compression::None, Compression::Lz4] {
            let name = format!("{:?}/{}", compression, count);
            group.throughput(Throughput::Elements(count));
            group.bench_function(BenchmarkId::from_parameter(name), |b| {
                b.iter(|| {
                    let mut writer = LogWriter::new("bench", compression);
                    let ch = writer.add_channel("/imu", "", "json", Default::default());
                    for i in 0..count {
                        let t = Time::from_nanos(i * 1_000);
                        writer.write(ch, t, t, &sample_payload(i)).unwrap();
                    }
                    black_box(writer.finish().unwrap().len())
                });
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_chunk_decode, bench_writer);
criterion_main!(benches);
