//! Per-application refresh driver: staleness check, rebuild, publish.
//!
//! A [`RefreshDriver`] owns one application's [`SlotPair`] and runs the
//! tick protocol against it:
//!
//! 1. Take the reserved slot. If a reader still pins it, end the tick
//!    ([`TickOutcome::ReservedPinned`]).
//! 2. Ask the application whether the reserved slot is stale. `NoUpdate`
//!    ends the tick. `Failed` is logged and treated as `NoUpdate`, unless
//!    it is the Nth consecutive failure and the forced-rebuild threshold
//!    is reached.
//! 3. Reset the reserved arena and rebuild. On failure the slot loses its
//!    root and nothing is published.
//! 4. Flip: the rebuilt slot becomes the published one.
//!
//! Every failure after registration stops at the tick boundary. Readers
//! keep seeing the last published slot.

use std::time::{Duration, Instant};

use duplex_arena::{Arena, RegionProvider};
use tracing::{debug, info, warn};

use crate::app::{SlotApp, Staleness};
use crate::config::AppConfig;
use crate::error::{RebuildError, RegisterError};
use crate::metrics::RefreshMetrics;
use crate::slot::{Pinned, RetiredSlot, Slot, SlotPair, SlotReader};

/// What a single tick did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The reserved slot was rebuilt and is now published.
    Published {
        /// Index of the newly published slot.
        slot: u8,
        /// Generation stamped on it.
        generation: u64,
        /// Its arena usage in percent.
        used_percent: u8,
        /// Whether the rebuild was forced by repeated failed checks.
        forced: bool,
    },
    /// The staleness check reported no update.
    NoUpdate,
    /// The staleness check failed; treated as no update.
    StaleCheckFailed {
        /// Consecutive failures so far, this one included.
        consecutive: u32,
    },
    /// The rebuild failed; the published slot is unchanged.
    RebuildFailed(RebuildError),
    /// A reader still holds the reserved slot; retried next tick.
    ReservedPinned,
}

impl TickOutcome {
    /// Whether this tick published a new slot.
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published { .. })
    }
}

/// Point-in-time view of one slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotDiagnostics {
    /// Slot index (0 or 1).
    pub index: u8,
    /// Whether a rebuild of the slot has ever completed.
    pub valid: bool,
    /// Generation of the slot's current contents.
    pub generation: u64,
    /// Arena usage in percent.
    pub used_percent: u8,
    /// Whether the arena ran out of space since its last reset.
    pub out_of_memory: bool,
}

impl SlotDiagnostics {
    fn of<R>(slot: &Slot<R>) -> Self {
        Self {
            index: slot.index(),
            valid: slot.is_valid(),
            generation: slot.generation(),
            used_percent: slot.used_percent(),
            out_of_memory: slot.out_of_memory(),
        }
    }
}

/// Point-in-time view of one application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppDiagnostics {
    /// Application name.
    pub name: String,
    /// The published slot, if any.
    pub published: Option<SlotDiagnostics>,
    /// The reserved slot.
    pub reserved: Option<SlotDiagnostics>,
    /// Whether a reader is holding the reserved slot.
    pub reserved_pinned: bool,
    /// Cumulative counters.
    pub metrics: RefreshMetrics,
}

/// Drives the tick protocol for one application.
pub struct RefreshDriver<A: SlotApp> {
    config: AppConfig,
    app: A,
    pair: SlotPair<A::Root>,
    metrics: RefreshMetrics,
    generation: u64,
    failed_checks: u32,
}

impl<A: SlotApp> RefreshDriver<A> {
    /// Acquire two regions from `provider` and build both slots.
    ///
    /// Slot 0 and slot 1 are rebuilt independently from scratch; both must
    /// succeed. Slot 0 is published, slot 1 becomes the reserved slot. On
    /// any failure every acquired region goes back to `provider`.
    pub fn start<P>(config: AppConfig, mut app: A, provider: &mut P) -> Result<Self, RegisterError>
    where
        P: RegionProvider + ?Sized,
    {
        config.validate()?;
        let mut generation = 0;
        let published = Self::initial_slot(0, &config, &mut app, provider, &mut generation)?;
        let reserved = match Self::initial_slot(1, &config, &mut app, provider, &mut generation) {
            Ok(slot) => slot,
            Err(e) => {
                provider.release(published.into_arena().into_region());
                return Err(e);
            }
        };
        info!(
            app = %config.name,
            reserved_bytes = config.reserved_bytes,
            used_percent = published.used_percent(),
            "app registered"
        );
        Ok(Self {
            config,
            app,
            pair: SlotPair::new(published, reserved),
            metrics: RefreshMetrics::default(),
            generation,
            failed_checks: 0,
        })
    }

    fn initial_slot<P>(
        index: u8,
        config: &AppConfig,
        app: &mut A,
        provider: &mut P,
        generation: &mut u64,
    ) -> Result<Slot<A::Root>, RegisterError>
    where
        P: RegionProvider + ?Sized,
    {
        let region = provider.acquire(config.reserved_bytes)?;
        let mut slot = Slot::new(index, Arena::new(region)?);
        let (arena, _) = slot.begin_rebuild();
        match app.rebuild(arena, None) {
            Ok(root) => {
                *generation += 1;
                slot.complete(root, *generation);
                Ok(slot)
            }
            Err(source) => {
                warn!(app = %config.name, slot = index, error = %source, "initial rebuild failed");
                provider.release(slot.into_arena().into_region());
                Err(RegisterError::InitialRebuild {
                    slot: index,
                    source,
                })
            }
        }
    }

    /// Run one tick of the refresh protocol.
    pub fn on_tick(&mut self) -> TickOutcome {
        self.metrics.ticks += 1;
        let name = self.config.name.as_str();

        let Some(reserved) = self.pair.reserved_mut() else {
            self.metrics.pinned_skips += 1;
            debug!(app = %name, "reserved slot still pinned by a reader");
            return TickOutcome::ReservedPinned;
        };

        let forced = match self.app.check_stale(reserved.arena(), reserved.root()) {
            None | Some(Staleness::NeedsUpdate) => {
                self.failed_checks = 0;
                false
            }
            Some(Staleness::NoUpdate) => {
                self.failed_checks = 0;
                self.metrics.no_update_ticks += 1;
                return TickOutcome::NoUpdate;
            }
            Some(Staleness::Failed) => {
                self.failed_checks += 1;
                self.metrics.stale_check_failures += 1;
                let consecutive = self.failed_checks;
                match self.config.force_rebuild_after_failed_checks {
                    Some(limit) if consecutive >= limit => {
                        warn!(app = %name, consecutive, "staleness check keeps failing; forcing rebuild");
                        self.failed_checks = 0;
                        self.metrics.forced_rebuilds += 1;
                        true
                    }
                    _ => {
                        warn!(app = %name, consecutive, "staleness check failed; treating as no update");
                        return TickOutcome::StaleCheckFailed { consecutive };
                    }
                }
            }
        };

        let started = Instant::now();
        let index = reserved.index();
        let (arena, previous) = reserved.begin_rebuild();
        let root = match self.app.rebuild(arena, previous) {
            Ok(root) => root,
            Err(error) => {
                self.metrics.rebuild_failures += 1;
                if error.is_transient() {
                    self.metrics.contention_retries += 1;
                    debug!(app = %name, slot = index, "input locked; retrying next tick");
                } else {
                    warn!(app = %name, slot = index, %error, "rebuild failed; keeping published slot");
                }
                return TickOutcome::RebuildFailed(error);
            }
        };

        self.generation += 1;
        let generation = self.generation;
        reserved.complete(root, generation);
        let used_percent = reserved.used_percent();
        if used_percent > self.config.capacity_warn_percent {
            self.metrics.capacity_warnings += 1;
            warn!(
                app = %name,
                slot = index,
                used_percent,
                threshold = self.config.capacity_warn_percent,
                "slot arena nearly full"
            );
        }

        self.pair.flip();
        self.metrics.publishes += 1;
        self.metrics.last_rebuild_us = duration_us(started.elapsed());
        self.metrics.last_used_percent = used_percent;
        debug!(app = %name, slot = index, generation, used_percent, "published");
        TickOutcome::Published {
            slot: index,
            generation,
            used_percent,
            forced,
        }
    }

    /// A new lock-free read handle.
    pub fn reader(&self) -> SlotReader<A::Root> {
        self.pair.reader()
    }

    /// Pin the published slot.
    pub fn get_current(&self) -> Option<Pinned<A::Root>> {
        self.pair.reader().get_current()
    }

    /// The application's configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The application itself.
    pub fn app(&self) -> &A {
        &self.app
    }

    /// Cumulative counters.
    pub fn metrics(&self) -> &RefreshMetrics {
        &self.metrics
    }

    /// Point-in-time view of both slots and the counters.
    pub fn diagnostics(&self) -> AppDiagnostics {
        AppDiagnostics {
            name: self.config.name.clone(),
            published: self.pair.published().as_deref().map(SlotDiagnostics::of),
            reserved: self.pair.reserved().map(SlotDiagnostics::of),
            reserved_pinned: self.pair.reserved_is_pinned(),
            metrics: self.metrics.clone(),
        }
    }

    /// Tear the application down and give its regions back.
    ///
    /// Calls [`SlotApp::teardown`] once, unpublishes the slots (readers get
    /// `None` from then on) and releases every region no reader still
    /// pins. Pinned slots come back as [`RetiredSlot`]s; the caller
    /// releases their regions once the pins drop.
    pub fn shutdown<P>(mut self, provider: &mut P) -> Vec<RetiredSlot>
    where
        P: RegionProvider + ?Sized,
    {
        self.app.teardown();
        let (slots, retired) = self.pair.dismantle();
        for slot in slots {
            provider.release(slot.into_arena().into_region());
        }
        if !retired.is_empty() {
            debug!(
                app = %self.config.name,
                pinned = retired.len(),
                "slots still pinned at unregister; deferring their release"
            );
        }
        info!(app = %self.config.name, "app unregistered");
        retired
    }
}

impl<A: SlotApp> std::fmt::Debug for RefreshDriver<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshDriver")
            .field("name", &self.config.name)
            .field("pair", &self.pair)
            .field("generation", &self.generation)
            .field("failed_checks", &self.failed_checks)
            .finish()
    }
}

/// Type-erased driver, so one registry can hold apps with different roots.
pub(crate) trait Refresh: Send {
    fn name(&self) -> &str;
    fn tick_interval(&self) -> Duration;
    fn on_tick(&mut self) -> TickOutcome;
    fn metrics(&self) -> &RefreshMetrics;
    fn diagnostics(&self) -> AppDiagnostics;
    fn shutdown(self: Box<Self>, provider: &mut dyn RegionProvider) -> Vec<RetiredSlot>;
}

impl<A: SlotApp> Refresh for RefreshDriver<A> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn tick_interval(&self) -> Duration {
        self.config.tick_interval
    }

    fn on_tick(&mut self) -> TickOutcome {
        RefreshDriver::on_tick(self)
    }

    fn metrics(&self) -> &RefreshMetrics {
        &self.metrics
    }

    fn diagnostics(&self) -> AppDiagnostics {
        RefreshDriver::diagnostics(self)
    }

    fn shutdown(self: Box<Self>, provider: &mut dyn RegionProvider) -> Vec<RetiredSlot> {
        RefreshDriver::shutdown(*self, provider)
    }
}

fn duration_us(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}
