use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rtbump::{Heap, PoolAllocator};

const BLOCKS: usize = 1024;

fn single_thread(c: &mut Criterion) {
    c.bench_function("alloc 16 bytes x1024", |b| {
        b.iter_batched_ref(
            || PoolAllocator::<_>::create("bench", 1, BLOCKS * 16, Heap).unwrap(),
            |pools| {
                for _ in 0..BLOCKS {
                    black_box(pools.alloc(16).unwrap());
                }
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("alloc 16 bytes aligned 16 x1024", |b| {
        b.iter_batched_ref(
            || PoolAllocator::<_>::create("bench", 1, BLOCKS * 32, Heap).unwrap(),
            |pools| {
                for _ in 0..BLOCKS {
                    black_box(pools.alloc_aligned(16, 16).unwrap());
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn contended(c: &mut Criterion) {
    const THREADS: usize = 4;
    c.bench_function("alloc 16 bytes x1024, 4 threads", |b| {
        b.iter_batched_ref(
            || PoolAllocator::<_>::create("bench", 1, THREADS * BLOCKS * 16, Heap).unwrap(),
            |pools| {
                let pools = &*pools;
                thread::scope(|s| {
                    for _ in 0..THREADS {
                        s.spawn(|| {
                            for _ in 0..BLOCKS {
                                black_box(pools.alloc(16).unwrap());
                            }
                        });
                    }
                });
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, single_thread, contended);
criterion_main!(benches);
