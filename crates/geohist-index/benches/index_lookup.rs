//! Index page build and lookup benchmarks.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use geohist_index::{
    IndexBuilder, IndexConfig, IndexPage, MemoryPageSource, PageEncodingPolicy, PagedLongIndex,
};

const PAGE_SIZE: u32 = 4096;

/// Every `stride`-th slot of one page, with slowly growing values.
fn page_entries(stride: u32) -> Vec<(u32, i64)> {
    (0..PAGE_SIZE)
        .step_by(stride as usize)
        .map(|slot| (slot, i64::from(slot) * 37 + 1_000_000))
        .collect()
}

fn page_lookup_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("page_lookup");

    for stride in [1, 8, 64, 512] {
        let entries = page_entries(stride);
        let page = IndexPage::build(PAGE_SIZE, &entries, PageEncodingPolicy::Smallest).unwrap();
        group.throughput(Throughput::Elements(u64::from(PAGE_SIZE)));

        group.bench_with_input(
            BenchmarkId::new(page.encoding().to_string(), stride),
            &page,
            |b, page| {
                b.iter(|| {
                    for slot in 0..PAGE_SIZE {
                        black_box(page.get(slot));
                    }
                });
            },
        );
    }

    group.finish();
}

fn build_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");

    for count in [10_000u64, 100_000] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("sparse_ids", count), &count, |b, &count| {
            b.iter(|| {
                let mut builder = IndexBuilder::new(0, IndexConfig::default());
                builder
                    .extend((0..count).map(|i| (i * 13, (i % 1_000) as i64)))
                    .unwrap();
                black_box(builder.build().unwrap());
            });
        });
    }

    group.finish();
}

fn reader_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_get");
    let count = 100_000u64;

    let mut builder = IndexBuilder::new(0, IndexConfig::default());
    builder
        .extend((0..count).map(|i| (i * 13, i as i64)))
        .unwrap();
    let built = builder.build().unwrap();
    let source = MemoryPageSource::new();
    source.store(&built);
    let index = PagedLongIndex::open(built.meta, source, 0).unwrap();

    group.throughput(Throughput::Elements(count));
    group.bench_function("cached", |b| {
        b.iter(|| {
            for i in 0..count {
                black_box(index.get(i * 13).unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(benches, page_lookup_benchmarks, build_benchmarks, reader_benchmarks);
criterion_main!(benches);
