//! Performance benchmarks for upstream traversal and layer extraction.
//!
//! Run with: `cargo bench --bench traversal`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Traversal, 100k edges | <100ms | Closure plus topological sort |
//! | Extraction, 100k rows | <50ms | Two id columns tested per row |

use criterion::{
    black_box, criterion_group, criterion_main,
    BenchmarkId, Criterion, Throughput,
};

use hydro_subset::{
    traverse, FlowEdge, LayerExtractor, NodeId, Subnetwork, Table, Value,
};

/// Complete binary drainage tree: node `i` drains into `(i - 1) / 2`.
fn make_tree(nodes: usize) -> Subnetwork {
    let edges = (1..nodes)
        .map(|i| FlowEdge::between(format!("wb-{}", i), format!("wb-{}", (i - 1) / 2)))
        .collect();
    Subnetwork::new(edges)
}

/// Layer with one row per node, keyed by `divide_id` and `toid`.
fn make_layer(nodes: usize) -> Table {
    let mut table = Table::new(["divide_id", "toid", "areasqkm"]);
    for i in 0..nodes {
        table.push_row(vec![
            Value::from(format!("cat-{}", i)),
            Value::from(format!("wb-{}", i)),
            Value::Float(i as f64 * 0.1),
        ]);
    }
    table
}

/// Benchmark traversal from the root of the whole tree.
fn bench_traverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("traverse");
    let outlet = NodeId::from("wb-0");

    for nodes in [1_000, 10_000, 100_000] {
        let network = make_tree(nodes);

        group.throughput(Throughput::Elements(nodes as u64));
        group.bench_with_input(BenchmarkId::new("edges", nodes), &network, |b, network| {
            b.iter(|| {
                let result = traverse(black_box(network), &outlet).unwrap();
                assert_eq!(result.len(), nodes);
                result
            })
        });
    }

    group.finish();
}

/// Benchmark extraction of the left half of the tree.
fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");
    let extractor = LayerExtractor::new();

    for nodes in [1_000, 10_000, 100_000] {
        let ids = traverse(&make_tree(nodes), &NodeId::from("wb-1")).unwrap().id_set();
        let layer = make_layer(nodes);

        group.throughput(Throughput::Elements(nodes as u64));
        group.bench_with_input(BenchmarkId::new("rows", nodes), &layer, |b, layer| {
            b.iter(|| extractor.extract("divides", black_box(layer), &ids, None).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_traverse, bench_extract);
criterion_main!(benches);
