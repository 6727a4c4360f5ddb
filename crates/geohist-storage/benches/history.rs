//! Block decode and point-in-time reconstruction benchmarks.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use geohist_codes::{CodeSpace, CodeTable};
use geohist_entity::{Coordinate, EntityKind, Tag, Timestamp, Version, VersionedEntity};
use geohist_storage::{TimestampSeries, reconstruct};

/// A node edited `len` times: small moves, a tag flip every tenth edit.
fn history(codes: &CodeTable, len: u32) -> VersionedEntity {
    let key = codes.resolve_one(CodeSpace::Key, "name").unwrap();
    let values = codes.resolve(CodeSpace::Value, &["a", "b"]).unwrap();
    let versions = (1..=len)
        .map(|v| {
            let value = values[if (v / 10) % 2 == 0 { "a" } else { "b" }];
            Version::node(
                v,
                Timestamp::from_secs(1_000_000 + u64::from(v) * 3_600),
                Coordinate::new(85_000_000 + v as i32 * 7, 475_000_000 - v as i32 * 3),
            )
            .with_tags([Tag::new(key, value)])
            .with_changeset(i64::from(v / 4))
        })
        .collect();
    VersionedEntity::new(EntityKind::Node, 42, versions).unwrap()
}

fn decode_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("block_decode");
    let codes = CodeTable::new();

    for len in [1, 16, 256] {
        let entity = history(&codes, len);
        let block = entity.encode(&codes).unwrap();
        group.throughput(Throughput::Bytes(block.len() as u64));
        group.bench_with_input(BenchmarkId::new("node", len), &block, |b, block| {
            b.iter(|| black_box(block.decode(&codes).unwrap()));
        });
    }

    group.finish();
}

fn reconstruct_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconstruct");
    let codes = CodeTable::new();
    let entity = history(&codes, 256);

    for steps in [1u64, 64, 4_096] {
        let end = 1_000_000 + 256 * 3_600;
        let step = (end - 1_000_000) / steps;
        let queries = TimestampSeries::new(
            Timestamp::from_secs(1_000_000),
            Timestamp::from_secs(end),
            step.max(1),
        )
        .unwrap()
        .to_vec();
        group.throughput(Throughput::Elements(queries.len() as u64));
        group.bench_with_input(BenchmarkId::new("series", steps), &queries, |b, queries| {
            b.iter(|| black_box(reconstruct(entity.newest_first(), queries).len()));
        });
    }

    group.finish();
}

criterion_group!(benches, decode_benchmarks, reconstruct_benchmarks);
criterion_main!(benches);
