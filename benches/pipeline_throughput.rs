//! Pipeline throughput benchmarks.
//!
//! Measures the synchronous stages of the streaming path: delta accumulation,
//! batch extraction, offset resolution, and region merging.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use veil_core::pii::{resolve_offsets, MaskRegionSet, PiiFinding, PiiKind, ResolvedDetection};
use veil_core::stream::{extract_batches, Cursor, StreamBuffer};

const VALUES: [(PiiKind, &str); 8] = [
    (PiiKind::Email, "alice@example.com"),
    (PiiKind::Phone, "555-0142"),
    (PiiKind::Email, "bob@example.org"),
    (PiiKind::FullName, "Carol Jensen"),
    (PiiKind::Phone, "555-0178"),
    (PiiKind::Email, "dave@example.net"),
    (PiiKind::FullName, "Erin Vasquez"),
    (PiiKind::Phone, "555-0101"),
];

fn prose(chars: usize) -> String {
    let sentence = "The meeting moved to Thursday and the notes were shared with the team. ";
    sentence.repeat(chars / sentence.len() + 1)
}

fn body_with_values(values: &[(PiiKind, &str)]) -> String {
    let mut body = String::new();
    for (_, value) in values {
        body.push_str("Some routine filler text that carries no signal at all. ");
        body.push_str(value);
        body.push_str(" followed by more ordinary prose to pad the batch. ");
    }
    body
}

fn bench_delta_accumulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("delta_accumulation");
    let delta = "and the answer continues with a little more text ";

    group.throughput(Throughput::Elements(200));
    group.bench_function("stream_loop_200_deltas", |b| {
        b.iter(|| {
            let mut buffer = StreamBuffer::new();
            let mut cursor = Cursor::default();
            let mut dispatched = 0usize;
            for i in 0..200 {
                buffer.append(black_box(delta));
                if (i + 1) % 10 == 0 {
                    let (pending, end) = buffer.appended_since(cursor);
                    dispatched += pending.chars().count();
                    cursor = end;
                }
            }
            black_box(dispatched)
        })
    });

    group.finish();
}

fn bench_batch_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_extraction");

    for (name, chars) in [("4kb", 4096), ("16kb", 16384), ("64kb", 65536)] {
        let text = prose(chars);
        group.throughput(Throughput::Bytes(text.len() as u64));
        group.bench_function(BenchmarkId::new("chars", name), |b| {
            b.iter(|| extract_batches(black_box(&text), 2000))
        });
    }

    group.finish();
}

fn bench_offset_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("offset_resolution");

    for count in [1usize, 4, 8] {
        let values = &VALUES[..count];
        let body = body_with_values(values);
        let findings: Vec<PiiFinding> = values
            .iter()
            .map(|(kind, value)| PiiFinding::with_confidence(*kind, *value, 0.9))
            .collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(BenchmarkId::new("findings", count), |b| {
            b.iter(|| resolve_offsets(black_box(&body), 0, black_box(&findings)))
        });
    }

    group.finish();
}

fn bench_region_merging(c: &mut Criterion) {
    let mut group = c.benchmark_group("region_merging");

    let disjoint: Vec<ResolvedDetection> = (0..32)
        .map(|i| ResolvedDetection {
            kind: PiiKind::Email,
            start_offset: i * 20,
            end_offset: i * 20 + 8,
            placeholder: "[EMAIL]".to_string(),
            confidence: 0.9,
        })
        .collect();

    // Every second detection overlaps its predecessor, forcing merges.
    let overlapping: Vec<ResolvedDetection> = (0..32)
        .map(|i| ResolvedDetection {
            kind: PiiKind::Email,
            start_offset: (i / 2) * 20 + (i % 2) * 4,
            end_offset: (i / 2) * 20 + (i % 2) * 4 + 8,
            placeholder: "[EMAIL]".to_string(),
            confidence: 0.9,
        })
        .collect();

    for (name, detections) in [("disjoint", &disjoint), ("overlapping", &overlapping)] {
        group.throughput(Throughput::Elements(detections.len() as u64));
        group.bench_function(BenchmarkId::new("inserts", name), |b| {
            b.iter(|| {
                let mut set = MaskRegionSet::new();
                for detection in detections.iter() {
                    black_box(set.insert_detection(detection));
                }
                black_box(set.len())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_delta_accumulation,
    bench_batch_extraction,
    bench_offset_resolution,
    bench_region_merging
);
criterion_main!(benches);
