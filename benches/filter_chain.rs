//! Criterion benchmarks for the record hot paths.
//!
//! Key metrics:
//! - Decode throughput for physics events of various sizes
//! - Mediator throughput with a realistic filter chain and predicates
//! - Unglom throughput for composite records
//!
//! Run with: cargo bench --bench filter_chain

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ringfilter::filter::{AbnormalEndFilter, KindCountFilter};
use ringfilter::mediator::Mediator;
use ringfilter::predicate::{ExcludeKindsPredicate, ProcessCountPredicate};
use ringfilter::record::{BodyHeader, FormatVersion, Record, RecordKind};
use ringfilter::transport::{MemorySink, MemorySource};
use ringfilter::unglom::{Unglom, UnglomConfig};

fn events(version: FormatVersion, count: usize, size: usize) -> Vec<Record> {
    (0..count)
        .map(|i| {
            Record::physics_event(
                version,
                Some(BodyHeader::new(i as u64, (i % 4) as u32, 0)),
                vec![0u8; size],
            )
        })
        .collect()
}

/// Decoding single physics events of increasing size.
fn record_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_decode");

    for size in [64usize, 1024, 16 * 1024] {
        let bytes = events(FormatVersion::V11, 1, size)[0].encode();
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        group.bench_with_input(BenchmarkId::new("physics_event", size), &bytes, |b, bytes| {
            b.iter(|| Record::decode(black_box(bytes), FormatVersion::V11).unwrap());
        });
    }

    group.finish();
}

/// Full mediator cycles through a three-filter chain and two predicates.
fn mediator_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("mediator");
    let records = events(FormatVersion::V11, 10_000, 256);
    group.throughput(Throughput::Elements(records.len() as u64));

    group.bench_function("chain_10k", |b| {
        b.iter(|| {
            let mut mediator =
                Mediator::new(MemorySource::new(records.clone()), MemorySink::new());
            mediator
                .register_filter(AbnormalEndFilter)
                .register_filter(KindCountFilter::new())
                .add_predicate(ExcludeKindsPredicate::new([RecordKind::Scaler]))
                .add_predicate(ProcessCountPredicate::new(100, 0));
            black_box(mediator.run().unwrap())
        });
    });

    group.finish();
}

/// Decomposing composite records into flat fragments.
fn unglom_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("unglom");
    let v = FormatVersion::V12;
    let composites: Vec<Record> = (0..1_000)
        .map(|i| {
            Record::composite(
                v,
                30,
                Some(BodyHeader::new(i, 0, 0)),
                events(v, 4, 128),
            )
            .unwrap()
        })
        .collect();
    group.throughput(Throughput::Elements(4 * composites.len() as u64));

    group.bench_function("composite_1k", |b| {
        b.iter(|| {
            let mut unglom = Unglom::new(
                MemorySource::new(composites.clone()),
                MemorySink::new(),
                UnglomConfig::default(),
            );
            black_box(unglom.run().unwrap())
        });
    });

    group.finish();
}

criterion_group!(benches, record_decode, mediator_throughput, unglom_throughput);
criterion_main!(benches);
