//! End-to-end refresh behaviour through the registry.

use std::time::{Duration, Instant};

use duplex_arena::{Arena, ArenaError, HeapRegionProvider};
use duplex_slot::{
    AppConfig, ConfigError, RebuildError, RegisterError, Registry, Staleness, TickOutcome,
};
use duplex_test_utils::{small_config, ScriptedApp};
use proptest::prelude::*;

#[test]
fn failed_rebuild_keeps_the_published_slot() {
    let mut registry = Registry::new();
    let (app, script) = ScriptedApp::new();
    let handle = registry.register(small_config("scripted"), app).unwrap();

    let before = handle.get_current().unwrap();
    script.fail_next_rebuild(RebuildError::corrupt("bad checksum"));
    let outcome = registry.tick(handle.id()).unwrap();
    assert!(matches!(outcome, TickOutcome::RebuildFailed(RebuildError::Corrupt { .. })));

    let after = handle.get_current().unwrap();
    assert!(after.same_slot(&before));
    assert_eq!(after.root(), before.root());
    assert_eq!(after.generation(), before.generation());

    // The next tick retries and publishes.
    drop((before, after));
    assert!(registry.tick(handle.id()).unwrap().is_published());
    let metrics = registry.metrics(handle.id()).unwrap();
    assert_eq!(metrics.rebuild_failures, 1);
    assert_eq!(metrics.publishes, 1);
}

#[test]
fn contention_is_counted_as_a_retry() {
    let mut registry = Registry::new();
    let (app, script) = ScriptedApp::new();
    let handle = registry.register(small_config("scripted"), app).unwrap();

    script.fail_next_rebuild(RebuildError::Contention);
    assert_eq!(
        registry.tick(handle.id()).unwrap(),
        TickOutcome::RebuildFailed(RebuildError::Contention)
    );
    assert_eq!(registry.metrics(handle.id()).unwrap().contention_retries, 1);
}

#[test]
fn no_update_ticks_touch_no_arena() {
    let mut registry = Registry::new();
    let (app, script) = ScriptedApp::new();
    script.set_fill_bytes(1024);
    let handle = registry.register(small_config("scripted"), app).unwrap();
    let id = handle.id();

    script.set_default_staleness(Some(Staleness::NoUpdate));
    let before = registry.app_diagnostics(id).unwrap();
    let rebuilds = script.counts().rebuilds();

    for _ in 0..2 {
        assert_eq!(registry.tick(id).unwrap(), TickOutcome::NoUpdate);
    }

    let after = registry.app_diagnostics(id).unwrap();
    assert_eq!(script.counts().rebuilds(), rebuilds);
    assert_eq!(
        after.reserved.as_ref().map(|s| s.used_percent),
        before.reserved.as_ref().map(|s| s.used_percent)
    );
    assert_eq!(after.published, before.published);
    assert_eq!(after.metrics.no_update_ticks, 2);
}

#[test]
fn region_smaller_than_the_header_is_refused() {
    let mut registry = Registry::new();
    let (app, script) = ScriptedApp::new();
    let err = registry
        .register(AppConfig::new("tiny", 8), app)
        .unwrap_err();
    assert!(matches!(
        err,
        RegisterError::InvalidConfig(ConfigError::RegionTooSmall { configured: 8, .. })
    ));
    assert!(registry.is_empty());
    assert_eq!(script.counts().rebuilds(), 0);
    assert!(registry.next_deadline().is_none());
}

#[test]
fn region_too_small_for_the_root_fails_initial_rebuild() {
    let provider = HeapRegionProvider::new();
    let mut registry = Registry::with_provider(provider);
    let (app, script) = ScriptedApp::new();
    script.set_fill_bytes(4096);
    let err = registry
        .register(AppConfig::new("cramped", Arena::HEADER_SIZE + 64), app)
        .unwrap_err();
    assert!(matches!(
        err,
        RegisterError::InitialRebuild {
            slot: 0,
            source: RebuildError::Capacity(ArenaError::OutOfMemory { .. })
        }
    ));
    assert!(registry.is_empty());
    // Every region acquired during the attempt went back.
    assert_eq!(registry.provider().outstanding(), 0);
}

#[test]
fn oversized_tick_interval_is_refused_before_any_region() {
    let mut registry = Registry::with_provider(HeapRegionProvider::new());
    let (app, script) = ScriptedApp::new();
    let config = AppConfig::new("forever", 1024).with_tick_interval(Duration::MAX);
    let err = registry.register(config, app).unwrap_err();
    assert_eq!(
        err,
        RegisterError::InvalidConfig(ConfigError::TickIntervalTooLarge {
            interval: Duration::MAX
        })
    );
    assert!(registry.is_empty());
    assert_eq!(script.counts().rebuilds(), 0);
    assert_eq!(registry.provider().outstanding(), 0);
}

#[test]
fn pinned_slot_goes_back_to_the_provider_after_unregister() {
    let mut registry = Registry::with_provider(HeapRegionProvider::with_budget(512));
    let (app, _script) = ScriptedApp::new();
    let handle = registry.register(AppConfig::new("budgeted", 256), app).unwrap();
    assert_eq!(registry.provider().outstanding(), 512);

    let pin = handle.get_current().unwrap();
    assert!(registry.unregister(&handle));
    // The reserved slot is released at once; the pinned one waits.
    assert_eq!(registry.provider().outstanding(), 256);
    assert_eq!(registry.retired_count(), 1);
    assert_eq!(registry.release_retired(), 0);

    drop(pin);
    registry.poll(Instant::now());
    assert_eq!(registry.retired_count(), 0);
    assert_eq!(registry.provider().outstanding(), 0);

    let (again, _script) = ScriptedApp::new();
    registry
        .register(AppConfig::new("budgeted", 256), again)
        .unwrap();
    assert_eq!(registry.provider().outstanding(), 512);
}

#[test]
fn repeated_failed_checks_force_a_rebuild() {
    let mut registry = Registry::new();
    let (app, script) = ScriptedApp::new();
    let config = small_config("flaky").with_forced_rebuild_after(Some(3));
    let handle = registry.register(config, app).unwrap();
    let id = handle.id();

    script.set_default_staleness(Some(Staleness::Failed));
    assert_eq!(
        registry.tick(id).unwrap(),
        TickOutcome::StaleCheckFailed { consecutive: 1 }
    );
    assert_eq!(
        registry.tick(id).unwrap(),
        TickOutcome::StaleCheckFailed { consecutive: 2 }
    );
    let forced = registry.tick(id).unwrap();
    assert!(matches!(forced, TickOutcome::Published { forced: true, .. }));

    // The counter starts over after a forced rebuild.
    assert_eq!(
        registry.tick(id).unwrap(),
        TickOutcome::StaleCheckFailed { consecutive: 1 }
    );
    let metrics = registry.metrics(id).unwrap();
    assert_eq!(metrics.forced_rebuilds, 1);
    assert_eq!(metrics.stale_check_failures, 4);
}

#[test]
fn failed_checks_never_force_when_disabled() {
    let mut registry = Registry::new();
    let (app, script) = ScriptedApp::new();
    let config = small_config("flaky").with_forced_rebuild_after(None);
    let handle = registry.register(config, app).unwrap();

    script.set_default_staleness(Some(Staleness::Failed));
    for n in 1..=20 {
        assert_eq!(
            registry.tick(handle.id()).unwrap(),
            TickOutcome::StaleCheckFailed { consecutive: n }
        );
    }
    assert_eq!(script.counts().rebuilds(), 2);
}

#[test]
fn a_good_check_resets_the_failure_streak() {
    let mut registry = Registry::new();
    let (app, script) = ScriptedApp::new();
    let config = small_config("flaky").with_forced_rebuild_after(Some(2));
    let handle = registry.register(config, app).unwrap();
    let id = handle.id();

    script
        .push_staleness(Staleness::Failed)
        .push_staleness(Staleness::NoUpdate)
        .push_staleness(Staleness::Failed);
    script.set_default_staleness(Some(Staleness::NoUpdate));
    assert!(matches!(registry.tick(id).unwrap(), TickOutcome::StaleCheckFailed { consecutive: 1 }));
    assert_eq!(registry.tick(id).unwrap(), TickOutcome::NoUpdate);
    assert!(matches!(registry.tick(id).unwrap(), TickOutcome::StaleCheckFailed { consecutive: 1 }));
}

#[test]
fn capacity_warning_is_reported_but_publishes() {
    let mut registry = Registry::new();
    let (app, script) = ScriptedApp::new();
    let config = AppConfig::new("full", 4096).with_capacity_warn_percent(50);
    let handle = registry.register(config, app).unwrap();

    script.set_fill_bytes(3500);
    let outcome = registry.tick(handle.id()).unwrap();
    let TickOutcome::Published { used_percent, .. } = outcome else {
        panic!("expected a publish, got {outcome:?}");
    };
    assert!(used_percent > 50);
    let metrics = registry.metrics(handle.id()).unwrap();
    assert_eq!(metrics.capacity_warnings, 1);
    assert_eq!(metrics.last_used_percent, used_percent);
}

#[test]
fn teardown_runs_once_and_unregister_is_idempotent() {
    let mut registry = Registry::new();
    let (app, script) = ScriptedApp::new();
    let handle = registry.register(small_config("once"), app).unwrap();

    assert!(registry.unregister(&handle));
    assert!(!registry.unregister(&handle));
    assert!(registry.tick(handle.id()).is_none());
    assert!(handle.get_current().is_none());
    assert_eq!(script.counts().teardowns(), 1);
    assert_eq!(registry.provider().outstanding(), 0);

    drop(registry);
    assert_eq!(script.counts().teardowns(), 1);
}

#[test]
fn poll_ticks_each_app_on_its_own_interval() {
    let start = Instant::now();
    let mut registry = Registry::new();
    let (fast, fast_script) = ScriptedApp::new();
    let (slow, slow_script) = ScriptedApp::new();
    let fast_cfg = AppConfig::new("fast", 1024).with_tick_interval(Duration::from_secs(1));
    let slow_cfg = AppConfig::new("slow", 1024).with_tick_interval(Duration::from_secs(5));
    registry.register_at(fast_cfg, fast, start).unwrap();
    registry.register_at(slow_cfg, slow, start).unwrap();

    for s in 1..=10 {
        registry.poll(start + Duration::from_secs(s));
    }
    // Two initial builds each, then one per tick.
    assert_eq!(fast_script.counts().rebuilds(), 2 + 10);
    assert_eq!(slow_script.counts().rebuilds(), 2 + 2);
}

proptest! {
    #[test]
    fn published_generation_never_goes_backwards(script in proptest::collection::vec(0u8..4, 1..40)) {
        let mut registry = Registry::new();
        let (app, handle_script) = ScriptedApp::new();
        let handle = registry.register(small_config("prop"), app).unwrap();
        let mut last = handle.reader().generation().unwrap();

        for step in script {
            match step {
                0 => { handle_script.push_staleness(Staleness::NoUpdate); }
                1 => { handle_script.push_staleness(Staleness::Failed); }
                2 => { handle_script.fail_next_rebuild(RebuildError::Contention); }
                _ => {}
            }
            let outcome = registry.tick(handle.id()).unwrap();
            let now = handle.reader().generation().unwrap();
            if outcome.is_published() {
                prop_assert!(now > last);
            } else {
                prop_assert_eq!(now, last);
            }
            last = now;
        }
    }
}
