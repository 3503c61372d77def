use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use trellis::{EdgeShuffleTopology, EntityTypeId, ParallelRuntime, SliceTypeSource, Topology};

fn bench_views(c: &mut Criterion) {
    let rt = ParallelRuntime::new(0).unwrap();
    let mut group = c.benchmark_group("topology");

    for &num_nodes in &[10_000usize, 100_000] {
        let base = Topology::uniform_random(num_nodes, 8, &rt).unwrap();
        let edge_types: Vec<EntityTypeId> = (0..base.num_edges())
            .map(|e| EntityTypeId((e % 4) as u32))
            .collect();
        let source = SliceTypeSource {
            edge_types: &edge_types,
            node_types: &[],
        };

        group.throughput(Throughput::Elements(base.num_edges() as u64));
        group.bench_with_input(
            BenchmarkId::new("transpose", num_nodes),
            &base,
            |b, base| b.iter(|| EdgeShuffleTopology::transpose_copy(base, &rt)),
        );
        group.bench_with_input(
            BenchmarkId::new("sort_by_dest", num_nodes),
            &base,
            |b, base| {
                b.iter_batched(
                    || EdgeShuffleTopology::original_copy(base, &rt),
                    |mut view| {
                        view.sort_edges_by_dest(&rt);
                        view
                    },
                    criterion::BatchSize::LargeInput,
                )
            },
        );
        group.bench_with_input(
            BenchmarkId::new("sort_by_type_then_dest", num_nodes),
            &base,
            |b, base| {
                b.iter_batched(
                    || EdgeShuffleTopology::original_copy(base, &rt),
                    |mut view| {
                        view.sort_edges_by_type_then_dest(&source, &rt);
                        view
                    },
                    criterion::BatchSize::LargeInput,
                )
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_views);
criterion_main!(benches);
