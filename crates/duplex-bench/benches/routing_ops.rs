//! Criterion benchmarks for blob decoding, request routing and publishing.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use duplex_arena::{Arena, Region};
use duplex_bench::{profile_blob, reference_profile, stress_limits, stress_profile};
use duplex_config::blob;
use duplex_config::{decode_routing_table, DecodeLimits, MemoryBlobSource, RoutingApp, RoutingView};
use duplex_slot::{AppConfig, Registry};

/// Benchmark: validate and decode the stress profile into a fresh arena.
fn bench_decode_stress(c: &mut Criterion) {
    let bytes = profile_blob(1, &stress_profile());
    let mut arena = Arena::new(Region::zeroed(4 << 20)).unwrap();
    c.bench_function("decode_stress_profile", |b| {
        b.iter(|| {
            arena.reset();
            let (header, payload) = blob::parse(&bytes).unwrap();
            let table =
                decode_routing_table(&mut arena, header.version, payload, &stress_limits())
                    .unwrap();
            black_box(table);
        });
    });
}

/// Benchmark: resolve and pick an upstream against a pinned reference table.
fn bench_route_and_pick(c: &mut Criterion) {
    let source = MemoryBlobSource::new(profile_blob(1, &reference_profile()));
    let mut registry = Registry::new();
    let handle = registry
        .register(
            AppConfig::new("bench", 1 << 20),
            RoutingApp::new(source, DecodeLimits::default()),
        )
        .unwrap();
    let paths = ["/v0/api/3", "/v3/api/9/users", "/static/logo.png"];

    let mut point = 0u64;
    c.bench_function("route_and_pick", |b| {
        b.iter(|| {
            let pinned = handle.get_current().unwrap();
            let view = RoutingView::of(&pinned);
            for (i, path) in paths.iter().enumerate() {
                let host = format!("host-{}.example.com", i * 5);
                let svc = view.route(&host, path, &["beta"]).unwrap();
                point = point.wrapping_add(0x9e37_79b9_7f4a_7c15);
                black_box(svc.pick(point));
            }
        });
    });
}

/// Benchmark: one full tick (version check, decode, flip) per iteration.
fn bench_tick_publish(c: &mut Criterion) {
    let doc = reference_profile();
    let source = MemoryBlobSource::new(profile_blob(1, &doc));
    let mut registry = Registry::new();
    let handle = registry
        .register(
            AppConfig::new("bench", 1 << 20),
            RoutingApp::new(source.clone(), DecodeLimits::default()),
        )
        .unwrap();

    let mut version = 2u64;
    c.bench_function("tick_publish_reference", |b| {
        b.iter(|| {
            source.publish(profile_blob(version, &doc));
            version += 1;
            black_box(registry.tick(handle.id()));
        });
    });
}

criterion_group!(
    benches,
    bench_decode_stress,
    bench_route_and_pick,
    bench_tick_publish
);
criterion_main!(benches);
