//! Benchmarks for forking workers and collecting their results.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use forkpool::map::{MapOptions, map};
use forkpool::pool::Pool;

fn bench_fork_and_await(c: &mut Criterion) {
    let mut group = c.benchmark_group("fork_and_await");
    group.sample_size(30);

    let mut pool: Pool<u64> = Pool::new(1).expect("Failed to create pool");
    group.bench_function("trivial_job", |b| {
        b.iter(|| {
            let id = pool.fork(|| Ok(black_box(42))).unwrap();
            black_box(pool.await_result(id).unwrap())
        });
    });

    // Payload size dominates transport cost
    for size in [1_000, 100_000].iter() {
        let mut pool: Pool<Vec<u64>> = Pool::new(1).expect("Failed to create pool");
        group.bench_with_input(BenchmarkId::new("vec_payload", size), size, |b, &size| {
            b.iter(|| {
                let id = pool.fork(move || Ok((0..size as u64).collect())).unwrap();
                black_box(pool.await_result(id).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("map");
    group.sample_size(20);

    for procs in [1, 4].iter() {
        let options = MapOptions::default().with_max_procs(*procs);
        group.bench_with_input(BenchmarkId::new("16_items", procs), procs, |b, _| {
            b.iter(|| {
                let results = map(0..16_u64, |n| Ok(n * 2), &options).unwrap();
                black_box(results)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fork_and_await, bench_map);
criterion_main!(benches);
