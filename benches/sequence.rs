//! Criterion benchmarks for sequence hot paths.
//!
//! Acquisition appends one frame per record while consumers look up windows by
//! timestamp, so both paths run at the data rate of the base station.
//!
//! Run with: cargo bench --bench sequence

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use trigno_daq::data::{Frame, Sample, SensorId, Sequence, Stamped};
use trigno_daq::tools::{Metric, Rms};

const RATE: f64 = 2000.0;

fn frame(sensors: usize) -> Frame {
    SensorId::all()
        .take(sensors)
        .map(|id| Sample::new(id, vec![0.5]))
        .collect()
}

fn sequence(len: usize, sensors: usize) -> Sequence {
    let frame = frame(sensors);
    (0..len)
        .map(|i| Stamped::new(i as f64 / RATE, frame.clone()))
        .collect()
}

/// Checked appends of full-width frames.
fn sequence_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequence_append");
    for sensors in [1usize, 4, 16] {
        let frame = frame(sensors);
        group.throughput(Throughput::Elements(1000));
        group.bench_with_input(BenchmarkId::new("checked", sensors), &sensors, |b, _| {
            b.iter(|| {
                let mut seq = Sequence::with_capacity(1000);
                for i in 0..1000 {
                    seq.append(Stamped::new(i as f64 / RATE, frame.clone()), true, true)
                        .unwrap();
                }
                black_box(seq.len())
            });
        });
    }
    group.finish();
}

/// Timestamp lookups in sequences of growing length.
fn sequence_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequence_find");
    for len in [1_000usize, 100_000, 1_000_000] {
        let seq = sequence(len, 1);
        let key = (len / 3) as f64 / RATE;
        group.bench_with_input(BenchmarkId::from_parameter(len), &key, |b, &key| {
            b.iter(|| black_box(seq.find(black_box(key))));
        });
    }
    group.finish();
}

/// Metric computation over one window of a 16-sensor recording.
fn range_metric(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_metric");
    let seq = sequence(10_000, 16);
    for width in [100usize, 1000] {
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::new("rms", width), &width, |b, &width| {
            b.iter(|| black_box(Rms.compute(&seq.range(5000, width, 0))));
        });
    }
    group.finish();
}

criterion_group!(benches, sequence_append, sequence_find, range_metric);
criterion_main!(benches);
