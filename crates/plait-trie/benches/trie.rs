//! Trie throughput benchmarks.
//!
//! The design targets are >5k upserts/sec and >200k gets/sec on
//! commodity hardware; the batch-size sweep shows how the compression
//! cadence trades insert cost against lookup depth.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use plait_trie::PatriciaTrie;

const KEYS: usize = 10_000;

fn random_pairs(n: usize) -> Vec<([u8; 32], [u8; 32])> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..n).map(|_| (rng.gen(), rng.gen())).collect()
}

fn bench_upsert(c: &mut Criterion) {
    let pairs = random_pairs(KEYS);

    let mut group = c.benchmark_group("upsert");
    group.throughput(Throughput::Elements(KEYS as u64));
    group.sample_size(10);

    for batch_size in [1000usize, 2000, 4000, 8000] {
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter(|| {
                    let trie = PatriciaTrie::new();
                    trie.set_batch_size(batch_size);
                    for (key, value) in &pairs {
                        trie.upsert(key, value).unwrap();
                    }
                    black_box(trie.root_hash())
                });
            },
        );
    }
    group.finish();
}

fn bench_get(c: &mut Criterion) {
    let pairs = random_pairs(KEYS);

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(KEYS as u64));

    for batch_size in [1000usize, 8000] {
        let trie = PatriciaTrie::new();
        trie.set_batch_size(batch_size);
        for (key, value) in &pairs {
            trie.upsert(key, value).unwrap();
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            &trie,
            |b, trie| {
                b.iter(|| {
                    for (key, _) in &pairs {
                        black_box(trie.get(key));
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_upsert, bench_get);
criterion_main!(benches);
