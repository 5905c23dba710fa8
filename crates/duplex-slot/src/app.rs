//! The capability an application plugs into the refresh driver.

use duplex_arena::Arena;

use crate::error::RebuildError;

/// Result of asking an application whether its reserved slot is stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Staleness {
    /// The check itself could not be completed. Treated as `NoUpdate`
    /// for this tick, subject to the forced-rebuild threshold.
    Failed,
    /// Newer input is available; rebuild the reserved slot.
    NeedsUpdate,
    /// The reserved slot is already current.
    NoUpdate,
}

/// An application whose configuration lives in a pair of arena slots.
///
/// The driver calls these methods from the single writer thread only, so
/// implementations need no internal synchronisation.
pub trait SlotApp: Send + 'static {
    /// Root of the structure built in a slot. Usually a small `Copy`
    /// record of arena handles plus a few plain fields.
    type Root: Clone + Send + Sync + 'static;

    /// Build a fresh structure into `arena`, which has just been reset.
    ///
    /// `previous` is the root the slot held before the reset. Plain fields
    /// in it (versions, counters) are still meaningful; arena handles in it
    /// are not, because the arena they pointed into has been reset.
    ///
    /// On error the slot is left without a root and nothing is published.
    fn rebuild(
        &mut self,
        arena: &mut Arena,
        previous: Option<Self::Root>,
    ) -> Result<Self::Root, RebuildError>;

    /// Decide whether the reserved slot needs a rebuild.
    ///
    /// `None` means the application has no staleness check; every tick then
    /// rebuilds unconditionally.
    fn check_stale(&mut self, arena: &Arena, reserved: Option<&Self::Root>) -> Option<Staleness> {
        let _ = (arena, reserved);
        None
    }

    /// Called exactly once when the application is unregistered.
    fn teardown(&mut self) {}
}
