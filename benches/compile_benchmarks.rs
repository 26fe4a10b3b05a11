// SPDX-License-Identifier: PMPL-1.0-or-later
//! Performance benchmarks for predicate compilation and evaluation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use fieldscope_query::{
    MemoryCorpus, PredicateFactory, PredicateNode, QueryCompiler, SearchScope, TargetIndex,
};
use fieldscope_schema::{FieldPath, ObjectField, Schema, StructureKind, ValueField};

/// Index with `depth` alternating nested/flattened hops above `leaf`.
fn deep_schema(index: &str, depth: usize) -> Schema {
    let mut object = ObjectField::nested().value("leaf", ValueField::keyword());
    for level in (0..depth.saturating_sub(1)).rev() {
        let structure = if level % 2 == 0 {
            StructureKind::Nested
        } else {
            StructureKind::Flattened
        };
        object = ObjectField::new(structure).object(format!("l{}", level + 1), object);
    }
    Schema::builder(index)
        .value("title", ValueField::text("standard"))
        .object("l0", object)
        .build()
        .unwrap()
}

fn deep_path(depth: usize) -> String {
    let mut segments: Vec<String> = (0..depth).map(|i| format!("l{}", i)).collect();
    segments.push("leaf".to_string());
    segments.join(".")
}

fn wide_query(f: &PredicateFactory, depth: usize, clauses: usize) -> PredicateNode {
    let path = deep_path(depth);
    f.and((0..clauses).map(|i| {
        f.or([
            f.match_field(&path).unwrap().matching(format!("v{}", i)),
            f.match_field("title").unwrap().matching("rust"),
        ])
    }))
}

// ============================================================================
// Path Resolution Benchmarks
// ============================================================================

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for depth in [1usize, 4, 8].iter() {
        let schema = deep_schema("a", *depth);
        let path = FieldPath::parse(&deep_path(*depth)).unwrap();
        group.bench_with_input(BenchmarkId::new("depth", depth), depth, |b, _| {
            b.iter(|| black_box(schema.resolve(&path).unwrap()))
        });
    }

    group.finish();
}

// ============================================================================
// Compilation Benchmarks
// ============================================================================

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    let compiler = QueryCompiler::default();
    let f = PredicateFactory::new();

    for clauses in [10usize, 100, 500].iter() {
        let single = SearchScope::single(TargetIndex::new(deep_schema("a", 4)));
        let query = wide_query(&f, 4, *clauses);
        group.throughput(Throughput::Elements(*clauses as u64));
        group.bench_with_input(BenchmarkId::new("single_index", clauses), clauses, |b, _| {
            b.iter(|| black_box(compiler.compile(&single, &query).unwrap()))
        });

        let multi = SearchScope::new([
            TargetIndex::new(deep_schema("a", 4)),
            TargetIndex::new(deep_schema("b", 4)),
            TargetIndex::new(deep_schema("c", 4)),
        ])
        .unwrap();
        group.bench_with_input(BenchmarkId::new("three_indexes", clauses), clauses, |b, _| {
            b.iter(|| black_box(compiler.compile(&multi, &query).unwrap()))
        });
    }

    group.finish();
}

// ============================================================================
// Evaluation Benchmarks
// ============================================================================

fn bench_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate");
    let scope = SearchScope::single(TargetIndex::new(deep_schema("a", 2)));
    let f = PredicateFactory::new();

    let mut corpus = MemoryCorpus::new();
    for i in 0..1000 {
        corpus.add(
            "a",
            format!("doc-{}", i),
            json!({
                "title": format!("Document {} about rust and search", i),
                "l0": [{"l1": [{"leaf": format!("v{}", i % 10)}]}]
            }),
        );
    }
    let compiled = QueryCompiler::default()
        .compile(&scope, &wide_query(&f, 2, 5))
        .unwrap();

    group.throughput(Throughput::Elements(1000));
    group.bench_function("search_1000_docs", |b| {
        b.iter(|| black_box(corpus.search(&scope, &compiled).unwrap()))
    });

    group.finish();
}

criterion_group!(resolution, bench_resolve);
criterion_group!(compilation, bench_compile);
criterion_group!(evaluation, bench_evaluate);

criterion_main!(resolution, compilation, evaluation);
