//! Explicit registry of slot applications and their tick schedule.
//!
//! [`Registry`] replaces a process-wide module table: it owns the region
//! provider and every registered [`RefreshDriver`], and the host drives it
//! by calling [`poll`](Registry::poll) (or hands it to a
//! [`RefreshThread`](crate::RefreshThread)). Apps with different root types
//! live side by side behind a type-erased driver.

use std::fmt;
use std::time::Instant;

use duplex_arena::{HeapRegionProvider, RegionProvider};
use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::app::SlotApp;
use crate::config::{AppConfig, ConfigError};
use crate::driver::{AppDiagnostics, Refresh, RefreshDriver, TickOutcome};
use crate::error::RegisterError;
use crate::metrics::RefreshMetrics;
use crate::slot::{Pinned, RetiredSlot, SlotReader};

/// Identity of a registered application, unique for the registry's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(u64);

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app#{}", self.0)
    }
}

/// Typed handle returned by [`Registry::register`].
///
/// Holds the application's read handle, so readers can be served without
/// going through the registry at all.
pub struct AppHandle<R> {
    id: AppId,
    reader: SlotReader<R>,
}

impl<R> AppHandle<R> {
    /// The application's id.
    pub fn id(&self) -> AppId {
        self.id
    }

    /// A lock-free read handle that can be moved to reader threads.
    pub fn reader(&self) -> SlotReader<R> {
        self.reader.clone()
    }
}

impl<R: Clone> AppHandle<R> {
    /// Pin the published slot. See [`SlotReader::get_current`].
    pub fn get_current(&self) -> Option<Pinned<R>> {
        self.reader.get_current()
    }
}

impl<R> Clone for AppHandle<R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            reader: self.reader.clone(),
        }
    }
}

impl<R> fmt::Debug for AppHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppHandle").field("id", &self.id).finish()
    }
}

/// Outcomes of one [`Registry::poll`] or [`Registry::tick_all`] call.
pub type PollOutcomes = SmallVec<[(AppId, TickOutcome); 4]>;

struct Entry {
    driver: Box<dyn Refresh>,
    next_due: Instant,
}

/// The set of registered applications and the provider backing them.
///
/// Slots of unregistered apps that readers still pin are kept until the
/// pins drop, and their regions go back to the provider on the next
/// [`poll`](Registry::poll), [`tick_all`](Registry::tick_all) or
/// [`release_retired`](Registry::release_retired).
///
/// Dropping the registry unregisters every remaining application.
pub struct Registry<P: RegionProvider = HeapRegionProvider> {
    provider: P,
    apps: IndexMap<AppId, Entry>,
    retired: Vec<RetiredSlot>,
    next_id: u64,
}

impl Registry<HeapRegionProvider> {
    /// Registry backed by an unbudgeted heap provider.
    pub fn new() -> Self {
        Self::with_provider(HeapRegionProvider::new())
    }
}

impl Default for Registry<HeapRegionProvider> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: RegionProvider> Registry<P> {
    /// Registry that takes slot regions from `provider`.
    pub fn with_provider(provider: P) -> Self {
        Self {
            provider,
            apps: IndexMap::new(),
            retired: Vec::new(),
            next_id: 0,
        }
    }

    /// The region provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Register an application, building both of its slots synchronously.
    ///
    /// The first scheduled tick is one `tick_interval` from now.
    pub fn register<A: SlotApp>(
        &mut self,
        config: AppConfig,
        app: A,
    ) -> Result<AppHandle<A::Root>, RegisterError> {
        self.register_at(config, app, Instant::now())
    }

    /// [`register`](Registry::register) with an explicit clock reading,
    /// for hosts that drive [`poll`](Registry::poll) with their own time.
    pub fn register_at<A: SlotApp>(
        &mut self,
        config: AppConfig,
        app: A,
        now: Instant,
    ) -> Result<AppHandle<A::Root>, RegisterError> {
        config.validate()?;
        if self.id_of(&config.name).is_some() {
            return Err(RegisterError::DuplicateName { name: config.name });
        }
        let next_due = now
            .checked_add(config.tick_interval)
            .ok_or(ConfigError::TickIntervalTooLarge {
                interval: config.tick_interval,
            })?;
        let driver = RefreshDriver::start(config, app, &mut self.provider)?;
        let reader = driver.reader();

        let id = AppId(self.next_id);
        self.next_id += 1;
        self.apps.insert(
            id,
            Entry {
                driver: Box::new(driver),
                next_due,
            },
        );
        Ok(AppHandle { id, reader })
    }

    /// Unregister the application behind `handle`.
    ///
    /// Returns `false` if it was already unregistered.
    pub fn unregister<R>(&mut self, handle: &AppHandle<R>) -> bool {
        self.unregister_id(handle.id)
    }

    /// Unregister by id. Runs the app's teardown once and releases its
    /// regions; a second call for the same id returns `false`.
    pub fn unregister_id(&mut self, id: AppId) -> bool {
        match self.apps.shift_remove(&id) {
            Some(entry) => {
                let retired = entry.driver.shutdown(&mut self.provider);
                self.retired.extend(retired);
                true
            }
            None => false,
        }
    }

    /// Pin the published slot of `handle`'s application.
    ///
    /// Returns `None` before the first publish and once the application has
    /// been unregistered.
    pub fn get_current<R: Clone>(&self, handle: &AppHandle<R>) -> Option<Pinned<R>> {
        handle.reader.get_current()
    }

    /// Tick one application now, regardless of its schedule.
    pub fn tick(&mut self, id: AppId) -> Option<TickOutcome> {
        self.apps.get_mut(&id).map(|e| e.driver.on_tick())
    }

    /// Tick every application now, in registration order.
    pub fn tick_all(&mut self) -> PollOutcomes {
        self.release_retired();
        self.apps
            .iter_mut()
            .map(|(id, entry)| (*id, entry.driver.on_tick()))
            .collect()
    }

    /// Tick every application whose interval has elapsed at `now`.
    ///
    /// Irregular calls are fine: a late poll ticks each due app once and
    /// schedules its next tick one interval after `now`, without catching
    /// up on missed intervals.
    pub fn poll(&mut self, now: Instant) -> PollOutcomes {
        self.release_retired();
        let due: SmallVec<[AppId; 8]> = self
            .apps
            .iter()
            .filter(|(_, e)| e.next_due <= now)
            .map(|(id, _)| *id)
            .collect();

        let mut outcomes = PollOutcomes::new();
        for id in due {
            let Some(entry) = self.apps.get_mut(&id) else {
                continue;
            };
            let outcome = entry.driver.on_tick();
            let interval = entry.driver.tick_interval();
            entry.next_due = match entry.next_due.checked_add(interval) {
                Some(next) if next > now => next,
                _ => now.checked_add(interval).unwrap_or(now),
            };
            debug!(app = %entry.driver.name(), ?outcome, "tick");
            outcomes.push((id, outcome));
        }
        outcomes
    }

    /// Release the regions of retired slots whose pins have all dropped.
    /// Returns how many regions went back to the provider.
    pub fn release_retired(&mut self) -> usize {
        let mut released = 0;
        for slot in std::mem::take(&mut self.retired) {
            match slot.try_reclaim() {
                Ok(arena) => {
                    self.provider.release(arena.into_region());
                    released += 1;
                }
                Err(slot) => self.retired.push(slot),
            }
        }
        if released > 0 {
            debug!(released, still_pinned = self.retired.len(), "retired slots released");
        }
        released
    }

    /// Slots of unregistered apps still waiting for readers to unpin them.
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    /// Earliest time at which some application becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.apps.values().map(|e| e.next_due).min()
    }

    /// Id of the application registered under `name`.
    pub fn id_of(&self, name: &str) -> Option<AppId> {
        self.apps
            .iter()
            .find(|(_, e)| e.driver.name() == name)
            .map(|(id, _)| *id)
    }

    /// Whether `id` is still registered.
    pub fn contains(&self, id: AppId) -> bool {
        self.apps.contains_key(&id)
    }

    /// Number of registered applications.
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    /// Whether no application is registered.
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    /// Counters for one application.
    pub fn metrics(&self, id: AppId) -> Option<&RefreshMetrics> {
        self.apps.get(&id).map(|e| e.driver.metrics())
    }

    /// Diagnostics for one application.
    pub fn app_diagnostics(&self, id: AppId) -> Option<AppDiagnostics> {
        self.apps.get(&id).map(|e| e.driver.diagnostics())
    }

    /// Diagnostics for every application, in registration order.
    pub fn diagnostics(&self) -> Vec<(AppId, AppDiagnostics)> {
        self.apps
            .iter()
            .map(|(id, e)| (*id, e.driver.diagnostics()))
            .collect()
    }
}

impl<P: RegionProvider> Drop for Registry<P> {
    fn drop(&mut self) {
        for (_, entry) in self.apps.drain(..) {
            let retired = entry.driver.shutdown(&mut self.provider);
            self.retired.extend(retired);
        }
        self.release_retired();
        if !self.retired.is_empty() {
            warn!(
                pinned = self.retired.len(),
                "registry dropped while readers pin slots; their regions are freed with the last pin"
            );
        }
    }
}

impl<P: RegionProvider> fmt::Debug for Registry<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("apps", &self.apps.values().map(|e| e.driver.name()).collect::<Vec<_>>())
            .field("retired", &self.retired.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}
