//! Readers racing the single writer never observe a torn slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use duplex_slot::{AppHandle, Registry, RefreshThread, TickOutcome};
use duplex_test_utils::{small_config, CounterApp, CounterRoot, CallCounts};

fn spawn_readers(
    handle: &AppHandle<CounterRoot>,
    stop: &Arc<AtomicBool>,
    n: usize,
) -> Vec<thread::JoinHandle<u64>> {
    (0..n)
        .map(|_| {
            let handle = handle.clone();
            let stop = Arc::clone(stop);
            thread::spawn(move || {
                let mut reads = 0u64;
                let mut last_generation = 0;
                while reads == 0 || !stop.load(Ordering::Relaxed) {
                    let pinned = handle.get_current().expect("app is registered");
                    let root = *pinned.root();
                    assert!(
                        root.is_consistent(pinned.arena()),
                        "torn read at build {}",
                        root.build
                    );
                    assert_eq!(pinned.generation(), root.build);
                    assert!(pinned.generation() >= last_generation);
                    last_generation = pinned.generation();
                    reads += 1;
                }
                reads
            })
        })
        .collect()
}

#[test]
fn readers_see_whole_builds_while_the_writer_ticks() {
    let counts = CallCounts::new();
    let mut registry = Registry::new();
    let app = CounterApp::new(counts.clone()).with_values_per_build(256);
    let handle = registry.register(small_config("counter"), app).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let readers = spawn_readers(&handle, &stop, 4);

    let mut published = 0;
    while published < 300 {
        match registry.tick(handle.id()).unwrap() {
            TickOutcome::Published { .. } => published += 1,
            TickOutcome::ReservedPinned => thread::yield_now(),
            other => panic!("unexpected outcome {other:?}"),
        }
    }
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }

    // Two initial builds plus one per publish.
    assert_eq!(counts.rebuilds(), 302);
    let metrics = registry.metrics(handle.id()).unwrap();
    assert_eq!(metrics.publishes, 300);
}

#[test]
fn background_thread_publishes_under_concurrent_reads() {
    let counts = CallCounts::new();
    let mut registry = Registry::new();
    let handle = registry
        .register(small_config("counter"), CounterApp::new(counts.clone()))
        .unwrap();
    let id = handle.id();

    let stop = Arc::new(AtomicBool::new(false));
    let readers = spawn_readers(&handle, &stop, 2);
    let refresher = RefreshThread::spawn(registry, Duration::from_millis(5)).unwrap();

    let start = handle.reader().generation().unwrap();
    while handle.reader().generation().unwrap() < start + 20 {
        thread::sleep(Duration::from_millis(1));
    }
    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }

    let registry = refresher.shutdown().unwrap();
    assert!(registry.metrics(id).unwrap().publishes >= 20);
    drop(registry);
    assert_eq!(counts.teardowns(), 1);
    assert!(handle.get_current().is_none());
}

#[test]
fn pinned_generation_survives_later_publishes() {
    let mut registry = Registry::new();
    let handle = registry
        .register(small_config("counter"), CounterApp::new(CallCounts::new()))
        .unwrap();

    let held = handle.get_current().unwrap();
    let first = held.root().build;
    // The held slot is published; the other one can be rebuilt once.
    assert!(registry.tick(handle.id()).unwrap().is_published());
    // Now the held slot is the reserved one, so the writer must wait.
    assert_eq!(
        registry.tick(handle.id()).unwrap(),
        TickOutcome::ReservedPinned
    );
    assert!(held.root().is_consistent(held.arena()));
    assert_eq!(held.root().build, first);

    drop(held);
    assert!(registry.tick(handle.id()).unwrap().is_published());
}
