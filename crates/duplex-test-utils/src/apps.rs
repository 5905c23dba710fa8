//! Mock slot applications.
//!
//! - [`CounterApp`]: rebuilds every tick, stamping a build number into
//!   both the root and the arena so readers can check they agree.
//! - [`ScriptedApp`]: staleness results and rebuild failures are queued
//!   from the test through a [`ScriptHandle`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use duplex_arena::{Arena, ArenaStr, Array};
use duplex_slot::{RebuildError, SlotApp, Staleness};
use parking_lot::Mutex;

/// Call counters shared between an app and the test that registered it.
#[derive(Clone, Debug, Default)]
pub struct CallCounts {
    rebuilds: Arc<AtomicUsize>,
    stale_checks: Arc<AtomicUsize>,
    teardowns: Arc<AtomicUsize>,
}

impl CallCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rebuilds(&self) -> usize {
        self.rebuilds.load(Ordering::SeqCst)
    }

    pub fn stale_checks(&self) -> usize {
        self.stale_checks.load(Ordering::SeqCst)
    }

    pub fn teardowns(&self) -> usize {
        self.teardowns.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

// ── CounterApp ──────────────────────────────────────────────────

/// Root built by [`CounterApp`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CounterRoot {
    /// Build number, starting at 1.
    pub build: u64,
    /// `"build-N"`, stored in the arena.
    pub label: ArenaStr,
    /// `values_per_build` copies of `build`.
    pub values: Array<u64>,
}

impl CounterRoot {
    /// Whether the arena contents match the root's build number.
    pub fn is_consistent(&self, arena: &Arena) -> bool {
        arena.str(self.label) == format!("build-{}", self.build)
            && self.values.iter(arena).all(|v| v == self.build)
    }
}

/// Rebuilds unconditionally on every tick.
#[derive(Debug)]
pub struct CounterApp {
    counts: CallCounts,
    builds: u64,
    values_per_build: u32,
}

impl CounterApp {
    pub fn new(counts: CallCounts) -> Self {
        Self {
            counts,
            builds: 0,
            values_per_build: 16,
        }
    }

    /// Number of `u64`s written per build.
    pub fn with_values_per_build(mut self, n: u32) -> Self {
        self.values_per_build = n;
        self
    }
}

impl SlotApp for CounterApp {
    type Root = CounterRoot;

    fn rebuild(
        &mut self,
        arena: &mut Arena,
        _previous: Option<CounterRoot>,
    ) -> Result<CounterRoot, RebuildError> {
        CallCounts::bump(&self.counts.rebuilds);
        let build = self.builds + 1;
        let label = arena.alloc_str(&format!("build-{build}"))?;
        let values = Array::<u64>::try_new(arena, self.values_per_build)?;
        for _ in 0..self.values_per_build {
            values.push_value(arena, &build)?;
        }
        self.builds = build;
        Ok(CounterRoot {
            build,
            label,
            values,
        })
    }

    fn teardown(&mut self) {
        CallCounts::bump(&self.counts.teardowns);
    }
}

// ── ScriptedApp ─────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Script {
    staleness: VecDeque<Staleness>,
    default_staleness: Option<Staleness>,
    rebuilds: VecDeque<Result<(), RebuildError>>,
    fill_bytes: usize,
}

/// Test-side control of a [`ScriptedApp`] after it has been registered.
#[derive(Clone, Debug, Default)]
pub struct ScriptHandle {
    script: Arc<Mutex<Script>>,
    counts: CallCounts,
}

impl ScriptHandle {
    /// Queue the result of the next staleness check.
    pub fn push_staleness(&self, s: Staleness) -> &Self {
        self.script.lock().staleness.push_back(s);
        self
    }

    /// Result of staleness checks once the queue is empty. `None` means
    /// "no check", so every tick rebuilds.
    pub fn set_default_staleness(&self, s: Option<Staleness>) -> &Self {
        self.script.lock().default_staleness = s;
        self
    }

    /// Make the next rebuild fail with `error`.
    pub fn fail_next_rebuild(&self, error: RebuildError) -> &Self {
        self.script.lock().rebuilds.push_back(Err(error));
        self
    }

    /// Let the next rebuild succeed (useful after queued failures).
    pub fn succeed_next_rebuild(&self) -> &Self {
        self.script.lock().rebuilds.push_back(Ok(()));
        self
    }

    /// Bytes every successful rebuild allocates, to drive arena usage.
    pub fn set_fill_bytes(&self, bytes: usize) -> &Self {
        self.script.lock().fill_bytes = bytes;
        self
    }

    pub fn counts(&self) -> &CallCounts {
        &self.counts
    }
}

/// Root is the build number.
#[derive(Debug)]
pub struct ScriptedApp {
    handle: ScriptHandle,
    builds: u64,
}

impl ScriptedApp {
    /// A new app and the handle that scripts it.
    pub fn new() -> (Self, ScriptHandle) {
        let handle = ScriptHandle::default();
        (
            Self {
                handle: handle.clone(),
                builds: 0,
            },
            handle,
        )
    }
}

impl SlotApp for ScriptedApp {
    type Root = u64;

    fn rebuild(&mut self, arena: &mut Arena, _previous: Option<u64>) -> Result<u64, RebuildError> {
        CallCounts::bump(&self.handle.counts.rebuilds);
        let (step, fill) = {
            let mut script = self.handle.script.lock();
            (script.rebuilds.pop_front().unwrap_or(Ok(())), script.fill_bytes)
        };
        step?;
        if fill > 0 {
            arena.try_allocate(fill)?;
        }
        self.builds += 1;
        Ok(self.builds)
    }

    fn check_stale(&mut self, _arena: &Arena, _reserved: Option<&u64>) -> Option<Staleness> {
        CallCounts::bump(&self.handle.counts.stale_checks);
        let mut script = self.handle.script.lock();
        script
            .staleness
            .pop_front()
            .or(script.default_staleness)
    }

    fn teardown(&mut self) {
        CallCounts::bump(&self.handle.counts.teardowns);
    }
}
