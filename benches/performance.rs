use criterion::{
    criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput,
};
use rand::prelude::{Rng, SeedableRng};
use rand::rngs::StdRng;
use std::hint::black_box;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use stratum::SkipList;

const DATASET_SIZE: u64 = 100_000;
const OPS_PER_THREAD: u64 = 1_000;

/// Pre-populates the index with a fixed set of keys.
fn setup_index() -> Arc<SkipList<u64, u64>> {
    let index = Arc::new(SkipList::new(false));
    for key in 0..DATASET_SIZE {
        index.insert(key, key * 2);
    }
    index
}

/// --- Sequential Inserts Benchmark ---
fn bench_sequential_inserts(c: &mut Criterion) {
    const BATCH: u64 = 10_000;

    let mut group = c.benchmark_group("Sequential Inserts");
    group.throughput(Throughput::Elements(BATCH));
    group.bench_function("insert", |b| {
        b.iter_batched(
            || SkipList::<u64, u64>::new(false),
            |index| {
                for key in 0..BATCH {
                    black_box(index.insert(key, key * 2));
                }
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

/// --- Point Lookup Benchmark ---
fn bench_point_lookups(c: &mut Criterion) {
    let index = setup_index();

    let mut group = c.benchmark_group("Point Lookups (GetValue)");
    group.throughput(Throughput::Elements(1));
    group.bench_function("get_value", |b| {
        let mut rng = StdRng::seed_from_u64(42);
        let mut rows = Vec::with_capacity(1);
        b.iter(|| {
            let key = rng.random_range(0..DATASET_SIZE);
            rows.clear();
            index.get_value(&key, &mut rows);
            black_box(&rows);
        });
    });
    group.finish();
}

/// --- Concurrent Reads Benchmark ---
fn bench_concurrent_reads(c: &mut Criterion) {
    let index = setup_index();

    let mut group = c.benchmark_group("Concurrent Reads (GetValue)");
    for &num_threads in &[2, 4, 8] {
        group.throughput(Throughput::Elements(OPS_PER_THREAD * num_threads as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_threads),
            &num_threads,
            |b, &num_threads| {
                b.iter_custom(|iters| {
                    let mut total = Duration::ZERO;
                    for _ in 0..iters {
                        let barrier = Arc::new(Barrier::new(num_threads));
                        let mut workers = Vec::new();
                        let start = Instant::now();
                        for t in 0..num_threads {
                            let index = index.clone();
                            let barrier = barrier.clone();
                            workers.push(thread::spawn(move || {
                                let mut rng = StdRng::seed_from_u64(t as u64);
                                let mut rows = Vec::with_capacity(1);
                                barrier.wait();
                                for _ in 0..OPS_PER_THREAD {
                                    let key = rng.random_range(0..DATASET_SIZE);
                                    rows.clear();
                                    index.get_value(&key, &mut rows);
                                    black_box(&rows);
                                }
                            }));
                        }
                        for worker in workers {
                            worker.join().unwrap();
                        }
                        total += start.elapsed();
                    }
                    total
                });
            },
        );
    }
    group.finish();
}

/// --- Concurrent Mixed Workload Benchmark ---
fn bench_concurrent_mixed(c: &mut Criterion) {
    let mut group = c.benchmark_group("Concurrent Mixed (Insert/Delete/Get)");
    let num_threads = 8usize;
    group.throughput(Throughput::Elements(OPS_PER_THREAD * num_threads as u64));
    group.bench_function(BenchmarkId::from_parameter(num_threads), |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::ZERO;
            for _ in 0..iters {
                let index: Arc<SkipList<u64, u64>> = Arc::new(SkipList::new(false));
                let barrier = Arc::new(Barrier::new(num_threads));
                let mut workers = Vec::new();
                let start = Instant::now();
                for t in 0..num_threads {
                    let index = index.clone();
                    let barrier = barrier.clone();
                    workers.push(thread::spawn(move || {
                        let mut rng = StdRng::seed_from_u64(t as u64);
                        let mut rows = Vec::with_capacity(1);
                        barrier.wait();
                        for _ in 0..OPS_PER_THREAD {
                            let key = rng.random_range(0..1000);
                            match rng.random_range(0..4) {
                                0 | 1 => {
                                    black_box(index.insert(key, key));
                                }
                                2 => {
                                    black_box(index.delete(&key, &key));
                                }
                                _ => {
                                    rows.clear();
                                    index.get_value(&key, &mut rows);
                                    black_box(&rows);
                                }
                            }
                        }
                    }));
                }
                for worker in workers {
                    worker.join().unwrap();
                }
                index.perform_garbage_collection();
                total += start.elapsed();
            }
            total
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_sequential_inserts,
    bench_point_lookups,
    bench_concurrent_reads,
    bench_concurrent_mixed
);
criterion_main!(benches);
