use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tabops_tabular::{merge, Dataset, JoinType};

fn dataset(rows: usize, matching_every: usize) -> (Dataset, Dataset) {
    let left = Dataset::new(
        vec!["k".into(), "x".into()],
        (0..rows)
            .map(|i| vec![i.to_string(), format!("left-{i}")])
            .collect(),
    );
    let right = Dataset::new(
        vec!["k".into(), "y".into()],
        (0..rows)
            .map(|i| vec![(i * matching_every).to_string(), format!("right-{i}")])
            .collect(),
    );
    (left, right)
}

fn bench_joins(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for rows in [1_000usize, 10_000] {
        let (left, right) = dataset(rows, 1);
        group.throughput(Throughput::Elements(rows as u64));
        for join in [JoinType::Inner, JoinType::Left, JoinType::Outer] {
            group.bench_with_input(
                BenchmarkId::new(join.as_str(), rows),
                &rows,
                |b, _| {
                    b.iter(|| {
                        merge(
                            black_box(&left),
                            black_box(&right),
                            join,
                            "k",
                            "k",
                            None,
                        )
                        .unwrap()
                    })
                },
            );
        }
    }

    group.finish();
}

fn bench_sparse_match(c: &mut Criterion) {
    // Every 10th key matches; exercises the left-only path.
    let (left, right) = dataset(10_000, 10);
    c.bench_function("merge/left_sparse_10k", |b| {
        b.iter(|| merge(black_box(&left), black_box(&right), JoinType::Left, "k", "k", None).unwrap())
    });
}

criterion_group!(benches, bench_joins, bench_sparse_match);
criterion_main!(benches);
