use criterion::{black_box, criterion_group, criterion_main, Criterion};

use bptree_index::{BPlusTree, NaturalOrder};

const N: i32 = 10_000;

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("Insert");
    group.sample_size(10);

    group.bench_function("sequential", |b| {
        b.iter(|| {
            let mut tree: BPlusTree<i32, i32, NaturalOrder<i32>> = BPlusTree::new(NaturalOrder::new());
            for k in 0..black_box(N) {
                tree.insert(k, k).unwrap();
            }
        });
    });
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("Get");
    group.sample_size(10);

    let mut tree: BPlusTree<i32, i32, NaturalOrder<i32>> = BPlusTree::new(NaturalOrder::new());
    for k in 0..N {
        tree.insert(k, k).unwrap();
    }

    group.bench_function("point_lookup", |b| {
        b.iter(|| {
            for k in 0..black_box(N) {
                black_box(tree.get(&k));
            }
        });
    });
    group.finish();
}

fn bench_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("Remove");
    group.sample_size(10);

    group.bench_function("sequential", |b| {
        b.iter_custom(|iters| {
            let start = std::time::Instant::now();
            for _ in 0..iters {
                let mut tree: BPlusTree<i32, i32, NaturalOrder<i32>> = BPlusTree::new(NaturalOrder::new());
                for k in 0..N {
                    tree.insert(k, k).unwrap();
                }
                for k in 0..black_box(N) {
                    tree.remove(&k).unwrap();
                }
            }
            start.elapsed()
        });
    });
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().measurement_time(std::time::Duration::from_secs(10));
    targets = bench_insert, bench_get, bench_remove
}
criterion_main!(benches);
