//! Criterion micro-benchmarks for arena allocation and container operations.

use std::cmp::Ordering;
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use duplex_arena::{fnv1a, Arena, ArenaStr, Array, HashTable, Region, TableOps};

struct ByName;

impl TableOps<ArenaStr> for ByName {
    type Key = str;

    fn hash_element(&self, arena: &Arena, element: &ArenaStr) -> u64 {
        fnv1a(arena.str(*element).as_bytes())
    }

    fn hash_key(&self, key: &str) -> u64 {
        fnv1a(key.as_bytes())
    }

    fn compare(&self, arena: &Arena, element: &ArenaStr, key: &str) -> Ordering {
        arena.str(*element).cmp(key)
    }
}

fn arena_1mb() -> Arena {
    Arena::new(Region::zeroed(1 << 20)).unwrap()
}

/// Benchmark: 10K small allocations, then reset.
fn bench_allocate_reset_10k(c: &mut Criterion) {
    let mut arena = arena_1mb();
    c.bench_function("arena_allocate_reset_10k", |b| {
        b.iter(|| {
            for _ in 0..10_000 {
                black_box(arena.allocate(24));
            }
            arena.reset();
        });
    });
}

/// Benchmark: push 10K u64s, sort descending, search every value.
fn bench_array_sort_search_10k(c: &mut Criterion) {
    let mut arena = arena_1mb();
    c.bench_function("array_sort_search_10k", |b| {
        b.iter(|| {
            arena.reset();
            let array = Array::<u64>::try_new(&mut arena, 10_000).unwrap();
            for i in 0..10_000u64 {
                array.push_value(&mut arena, &(i * 7919 % 10_007)).unwrap();
            }
            array.sort_by(&mut arena, |_, a, b| b.cmp(a));
            for k in (0..10_007u64).step_by(97) {
                black_box(array.search(&arena, &k, |_, k, e| e.cmp(k)));
            }
        });
    });
}

/// Benchmark: index 1K interned names, then look each one up.
fn bench_hash_table_1k(c: &mut Criterion) {
    let names: Vec<String> = (0..1_000).map(|i| format!("service-{i}")).collect();
    let mut arena = arena_1mb();
    c.bench_function("hash_table_add_get_1k", |b| {
        b.iter(|| {
            arena.reset();
            let table = HashTable::<ArenaStr>::try_new(&mut arena, 1024).unwrap();
            let slots = Array::<ArenaStr>::try_new(&mut arena, 1_000).unwrap();
            for name in &names {
                let s = arena.alloc_str(name).unwrap();
                let ptr = slots.push_value(&mut arena, &s).unwrap();
                table.add(&mut arena, &ByName, ptr).unwrap();
            }
            for name in &names {
                black_box(table.get(&arena, &ByName, name.as_str()));
            }
        });
    });
}

criterion_group!(
    benches,
    bench_allocate_reset_10k,
    bench_array_sort_search_10k,
    bench_hash_table_1k
);
criterion_main!(benches);
