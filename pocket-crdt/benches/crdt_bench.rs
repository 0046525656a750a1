//! Rich-text and counter benchmarks.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use pocket_crdt::{PNCounter, RichText, TextOperation};
use pocket_types::NodeId;
use std::hint::black_box;

// =============================================================================
// Test Data Generation
// =============================================================================

fn paragraph(len: usize) -> String {
    "lorem ipsum dolor sit amet ".chars().cycle().take(len).collect()
}

fn remote_ops(len: usize) -> Vec<TextOperation> {
    let mut doc = RichText::new(NodeId::new("author"));
    doc.insert(0, &paragraph(len));
    doc.delete(len / 4, len / 4);
    doc.format(0, len / 2, "bold", None);
    doc.flush_ops()
}

// =============================================================================
// Local Editing
// =============================================================================

fn bench_local_typing(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_typing");
    for len in [100usize, 1_000, 5_000] {
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            b.iter(|| {
                let mut doc = RichText::new(NodeId::new("typist"));
                for (i, c) in paragraph(len).chars().enumerate() {
                    doc.insert(i, &c.to_string());
                }
                black_box(doc.len())
            });
        });
    }
    group.finish();
}

// =============================================================================
// Remote Integration
// =============================================================================

fn bench_remote_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("remote_batch");
    for len in [100usize, 1_000, 5_000] {
        let ops = remote_ops(len);
        group.throughput(Throughput::Elements(ops.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &ops, |b, ops| {
            b.iter(|| {
                let mut doc = RichText::new(NodeId::new("reader"));
                black_box(doc.apply_remote_ops(ops))
            });
        });
    }
    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let ops = remote_ops(2_000);
    let mut doc = RichText::new(NodeId::new("reader"));
    doc.apply_remote_ops(&ops);

    c.bench_function("snapshot_2000", |b| b.iter(|| black_box(doc.snapshot())));
}

fn bench_counter_merge(c: &mut Criterion) {
    let counters: Vec<PNCounter> = (0..64)
        .map(|i| {
            let mut counter = PNCounter::new();
            counter.increment(&NodeId::new(format!("node-{i}")), i);
            counter
        })
        .collect();

    c.bench_function("pn_counter_merge_64", |b| {
        b.iter(|| {
            let mut merged = PNCounter::new();
            for counter in &counters {
                merged.merge(counter);
            }
            black_box(merged.value())
        });
    });
}

criterion_group!(
    benches,
    bench_local_typing,
    bench_remote_batch,
    bench_snapshot,
    bench_counter_merge
);
criterion_main!(benches);
