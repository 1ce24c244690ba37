use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lineage::{task, BackoffMode, Protected, ResourcePool, SpinConfig, WorkerBuilder};
use std::sync::{Arc, Mutex};
use std::thread;

const THREADS: usize = 4;
const ROUNDS: usize = 1_000;

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended");

    group.bench_function("std_mutex", |b| {
        let value = Mutex::new(0_u64);
        b.iter(|| {
            *value.lock().unwrap() += 1;
        });
        black_box(value.into_inner().unwrap());
    });

    group.bench_function("guard_reuse", |b| {
        let pool = ResourcePool::new();
        let value = Protected::new(0_u64);
        let mut guard = pool.branch(&value).unwrap();
        b.iter(|| {
            *guard.get().unwrap() += 1;
            guard.release();
        });
    });

    group.bench_function("guard_branch_each_time", |b| {
        let pool = ResourcePool::new();
        let value = Protected::new(0_u64);
        b.iter(|| {
            *pool.branch(&value).unwrap() += 1;
        });
    });

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended");

    group.bench_function("std_mutex", |b| {
        let value = Arc::new(Mutex::new(0_u64));
        b.iter(|| {
            thread::scope(|s| {
                for _ in 0..THREADS {
                    let value = &value;
                    s.spawn(move || {
                        for _ in 0..ROUNDS {
                            *value.lock().unwrap() += 1;
                        }
                    });
                }
            });
        });
    });

    for (label, backoff) in [("guard_spin", BackoffMode::Spin), ("guard_snooze", BackoffMode::Snooze)] {
        group.bench_function(label, |b| {
            let pool = ResourcePool::with_config(SpinConfig::unbounded().backoff(backoff));
            let value = Protected::new(0_u64);
            b.iter(|| {
                thread::scope(|s| {
                    for _ in 0..THREADS {
                        let (pool, value) = (&pool, &value);
                        s.spawn(move || {
                            let mut guard = pool.branch(value).unwrap();
                            for _ in 0..ROUNDS {
                                *guard.get().unwrap() += 1;
                                guard.release();
                            }
                        });
                    }
                });
            });
        });
    }

    group.finish();
}

fn bench_tree_hand_off(c: &mut Criterion) {
    c.bench_function("tree_root_plus_children", |b| {
        b.iter(|| {
            let mut root = WorkerBuilder::new().spawn(task(|_ctx| black_box(1_u32))).unwrap();
            let children: Vec<_> = (0..THREADS)
                .map(|_| {
                    WorkerBuilder::new()
                        .parent(&root)
                        .spawn(task(|_ctx| black_box(2_u32)))
                        .unwrap()
                })
                .collect();
            root.join().unwrap();
            drop(children);
        });
    });
}

criterion_group!(benches, bench_uncontended, bench_contended, bench_tree_hand_off);
criterion_main!(benches);
