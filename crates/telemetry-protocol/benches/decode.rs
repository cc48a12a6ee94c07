//! Benchmarks for record decoding

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use telemetry_protocol::{record_len, TelemetryPacket};

/// Build a record with `scans` scan blocks of varying samples
fn make_record(scans: usize, sequence: u8) -> Vec<u8> {
    let mut record: Vec<u8> = (0..scans * 8).map(|i| (i * 37 % 256) as u8).collect();
    record.push(0x0F);
    record.push(sequence);
    record
}

fn bench_decode_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_record");

    for scans in [1usize, 10, 30, 60].iter() {
        let record = make_record(*scans, 42);
        group.throughput(Throughput::Bytes(record_len(*scans) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(scans), scans, |b, _| {
            b.iter(|| TelemetryPacket::decode(black_box(&record)))
        });
    }

    group.finish();
}

fn bench_decode_session(c: &mut Criterion) {
    // One second of streaming at ~1 Mbit/s with 30 scans per notification
    let records: Vec<Vec<u8>> = (0..540).map(|i| make_record(30, (i % 256) as u8)).collect();

    c.bench_function("decode_session_540x30", |b| {
        b.iter(|| {
            let packets: Vec<TelemetryPacket> = records
                .iter()
                .filter_map(|record| TelemetryPacket::decode(black_box(record)).ok())
                .collect();
            black_box(packets)
        })
    });
}

criterion_group!(benches, bench_decode_record, bench_decode_session);
criterion_main!(benches);
