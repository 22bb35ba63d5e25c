//! Benchmarks for the sharded answer cache.
//!
//! Measures lookups that hit and miss, stores, and lookups under contention
//! from several tokio tasks.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;
use tokio::runtime::Runtime;

use anchorage::Security;
use anchorage::cache::{Cache, CacheLimits, CachedData};
use anchorage::dns::{Question, RecordSet, class, parse_records, rtype};

const ENTRIES: usize = 10_000;

fn question(i: usize) -> Question {
    let name = format!("host{i}.example.com.").parse().unwrap();
    Question::new(name, rtype::A, class::IN)
}

fn data(i: usize) -> CachedData {
    let text = format!("host{i}.example.com. 300 IN A 192.0.2.{}", i % 250);
    CachedData::Positive(RecordSet::new(parse_records(&text).unwrap(), Vec::new()))
}

fn filled_cache() -> Arc<Cache> {
    let cache = Arc::new(Cache::new(CacheLimits::default()));
    for i in 0..ENTRIES {
        cache.store(question(i), data(i), 300, Security::Insecure);
    }
    cache
}

fn bench_lookup(c: &mut Criterion) {
    let cache = filled_cache();
    let hit = question(ENTRIES / 2);
    let miss = question(ENTRIES * 2);

    let mut group = c.benchmark_group("lookup");
    group.throughput(Throughput::Elements(1));
    group.bench_function("hit", |b| b.iter(|| cache.lookup(black_box(&hit))));
    group.bench_function("miss", |b| b.iter(|| cache.lookup(black_box(&miss))));
    group.finish();
}

fn bench_store(c: &mut Criterion) {
    let cache = filled_cache();
    let mut i = 0;

    let mut group = c.benchmark_group("store");
    group.throughput(Throughput::Elements(1));
    group.bench_function("replace", |b| {
        b.iter(|| {
            i = (i + 1) % ENTRIES;
            cache.store(question(i), data(i), 300, Security::Secure);
        })
    });
    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = filled_cache();

    let mut group = c.benchmark_group("contended_lookup");
    for tasks in [1usize, 4, 16] {
        group.throughput(Throughput::Elements(tasks as u64 * 100));
        group.bench_with_input(BenchmarkId::from_parameter(tasks), &tasks, |b, &tasks| {
            b.to_async(&rt).iter(|| {
                let cache = cache.clone();
                async move {
                    let handles: Vec<_> = (0..tasks)
                        .map(|t| {
                            let cache = cache.clone();
                            tokio::spawn(async move {
                                for i in 0..100 {
                                    black_box(cache.lookup(&question((t * 100 + i) % ENTRIES)));
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.await.unwrap();
                    }
                }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_lookup, bench_store, bench_contended);
criterion_main!(benches);
