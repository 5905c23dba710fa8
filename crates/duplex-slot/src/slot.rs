//! Slots, the double-buffered slot pair, and the lock-free read path.
//!
//! A [`SlotPair`] holds two [`Slot`]s. One is *published*: it sits behind an
//! [`ArcSwapOption`] that readers load without locking. The other is
//! *reserved*: owned by the single writer and the only one a rebuild may
//! touch. Publishing swaps the reserved slot in and takes the previously
//! published one back as the new reserved slot.
//!
//! ```text
//!            writer (one)                        readers (many)
//!  reserved: Slot<R> ──flip──► published: ArcSwapOption<Slot<R>> ◄── load_full()
//!        ▲                              │
//!        └──── Arc::try_unwrap ◄────────┘  (fails while a Pinned is alive)
//! ```
//!
//! Because a published slot is only reachable through `Arc<Slot<R>>`, which
//! hands out shared references only, it cannot be mutated. A reader that
//! still holds a [`Pinned`] after a flip keeps the old slot alive, and the
//! writer simply cannot reclaim it until the pin is dropped.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use duplex_arena::Arena;

/// One generation of (arena, built root).
pub struct Slot<R> {
    index: u8,
    arena: Arena,
    root: Option<R>,
    valid: bool,
    generation: u64,
}

impl<R> Slot<R> {
    /// Wrap an empty arena as slot `index` (0 or 1). The slot starts
    /// invalid, with no root.
    pub fn new(index: u8, arena: Arena) -> Self {
        Self {
            index,
            arena,
            root: None,
            valid: false,
            generation: 0,
        }
    }

    /// Slot index within its pair.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// The slot's arena.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Root of the structure built by the last successful rebuild, if the
    /// slot currently holds one.
    pub fn root(&self) -> Option<&R> {
        self.root.as_ref()
    }

    /// Whether a rebuild of this slot has ever completed.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Generation stamped by the last successful rebuild (0 = never).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Arena usage in percent.
    pub fn used_percent(&self) -> u8 {
        self.arena.used_percent()
    }

    /// Whether the arena ran out of space since its last reset.
    pub fn out_of_memory(&self) -> bool {
        self.arena.out_of_memory()
    }

    /// Clear the root and reset the arena, returning the old root.
    pub(crate) fn begin_rebuild(&mut self) -> (&mut Arena, Option<R>) {
        let previous = self.root.take();
        self.arena.reset();
        (&mut self.arena, previous)
    }

    /// Record a successful rebuild.
    pub(crate) fn complete(&mut self, root: R, generation: u64) {
        self.root = Some(root);
        self.valid = true;
        self.generation = generation;
    }

    /// Hand back the arena so its region can be released.
    pub(crate) fn into_arena(self) -> Arena {
        self.arena
    }
}

impl<R> std::fmt::Debug for Slot<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("index", &self.index)
            .field("valid", &self.valid)
            .field("has_root", &self.root.is_some())
            .field("generation", &self.generation)
            .field("arena", &self.arena)
            .finish()
    }
}

/// A reader's hold on the published slot.
///
/// While a `Pinned` is alive its slot cannot be recycled as the reserved
/// slot, so every handle inside [`root`](Pinned::root) stays resolvable
/// against [`arena`](Pinned::arena).
pub struct Pinned<R> {
    slot: Arc<Slot<R>>,
    root: R,
}

impl<R> Pinned<R> {
    /// The published root.
    pub fn root(&self) -> &R {
        &self.root
    }

    /// The arena the root's handles point into.
    pub fn arena(&self) -> &Arena {
        &self.slot.arena
    }

    /// Generation of the pinned slot.
    pub fn generation(&self) -> u64 {
        self.slot.generation
    }

    /// Index of the pinned slot (0 or 1).
    pub fn slot_index(&self) -> u8 {
        self.slot.index
    }

    /// Whether two pins refer to the same published slot generation.
    pub fn same_slot(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<R: std::fmt::Debug> std::fmt::Debug for Pinned<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pinned")
            .field("slot", &self.slot.index)
            .field("generation", &self.slot.generation)
            .field("root", &self.root)
            .finish()
    }
}

/// Cloneable, lock-free read handle onto one application's published slot.
pub struct SlotReader<R> {
    published: Arc<ArcSwapOption<Slot<R>>>,
}

impl<R> Clone for SlotReader<R> {
    fn clone(&self) -> Self {
        Self {
            published: Arc::clone(&self.published),
        }
    }
}

impl<R: Clone> SlotReader<R> {
    /// Pin the published slot if it holds a valid root.
    ///
    /// Returns `None` before the first publish and after the application
    /// is unregistered.
    pub fn get_current(&self) -> Option<Pinned<R>> {
        let slot = self.published.load_full()?;
        if !slot.valid {
            return None;
        }
        let root = slot.root.clone()?;
        Some(Pinned { slot, root })
    }
}

impl<R> SlotReader<R> {
    /// Generation of the published slot, without pinning it.
    pub fn generation(&self) -> Option<u64> {
        self.published.load().as_ref().map(|s| s.generation)
    }
}

impl<R> std::fmt::Debug for SlotReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotReader")
            .field("generation", &self.generation())
            .finish()
    }
}

/// Where the writer's reserved slot currently is.
enum Reserved<R> {
    /// Exclusively owned; free to rebuild.
    Owned(Slot<R>),
    /// Just unpublished; readers may still hold pins on it.
    Retired(Arc<Slot<R>>),
}

/// Two slots: one published to readers, one reserved for the writer.
pub struct SlotPair<R> {
    published: Arc<ArcSwapOption<Slot<R>>>,
    reserved: Option<Reserved<R>>,
}

impl<R> SlotPair<R> {
    /// Publish `published` and keep `reserved` for the next rebuild.
    pub fn new(published: Slot<R>, reserved: Slot<R>) -> Self {
        Self {
            published: Arc::new(ArcSwapOption::from_pointee(published)),
            reserved: Some(Reserved::Owned(reserved)),
        }
    }

    /// A new read handle onto the published slot.
    pub fn reader(&self) -> SlotReader<R> {
        SlotReader {
            published: Arc::clone(&self.published),
        }
    }

    /// The published slot, if any.
    pub fn published(&self) -> Option<Arc<Slot<R>>> {
        self.published.load_full()
    }

    /// Index of the published slot (the `current` cursor).
    pub fn current_index(&self) -> Option<u8> {
        self.published.load().as_ref().map(|s| s.index)
    }

    /// Read-only view of the reserved slot, pinned or not.
    pub fn reserved(&self) -> Option<&Slot<R>> {
        match self.reserved.as_ref()? {
            Reserved::Owned(slot) => Some(slot),
            Reserved::Retired(arc) => Some(arc),
        }
    }

    /// Exclusive access to the reserved slot.
    ///
    /// Returns `None` while a reader still pins the slot that was
    /// unpublished by the last flip.
    pub fn reserved_mut(&mut self) -> Option<&mut Slot<R>> {
        self.reserved = match self.reserved.take() {
            Some(Reserved::Retired(arc)) => Some(match Arc::try_unwrap(arc) {
                Ok(slot) => Reserved::Owned(slot),
                Err(arc) => Reserved::Retired(arc),
            }),
            other => other,
        };
        match self.reserved.as_mut()? {
            Reserved::Owned(slot) => Some(slot),
            Reserved::Retired(_) => None,
        }
    }

    /// Whether a reader is holding the reserved slot.
    pub fn reserved_is_pinned(&self) -> bool {
        matches!(&self.reserved, Some(Reserved::Retired(arc)) if Arc::strong_count(arc) > 1)
    }

    /// Publish the reserved slot and retire the published one.
    ///
    /// Returns `false` (and does nothing) if the reserved slot is not
    /// exclusively owned.
    pub fn flip(&mut self) -> bool {
        let slot = match self.reserved.take() {
            Some(Reserved::Owned(slot)) => slot,
            other => {
                self.reserved = other;
                return false;
            }
        };
        let previous = self.published.swap(Some(Arc::new(slot)));
        self.reserved = previous.map(Reserved::Retired);
        // Reclaim right away when no reader holds the old slot.
        let _ = self.reserved_mut();
        true
    }

}

impl<R: Send + Sync + 'static> SlotPair<R> {
    /// Unpublish both slots.
    ///
    /// Returns the slots that can be reclaimed now, and the ones readers
    /// still pin as [`RetiredSlot`]s to be reclaimed once the pins drop.
    pub fn dismantle(mut self) -> (Vec<Slot<R>>, Vec<RetiredSlot>) {
        let mut reclaimed = Vec::with_capacity(2);
        let mut retired = Vec::new();
        let published = self.published.swap(None).map(Reserved::Retired);
        for reserved in [published, self.reserved.take()].into_iter().flatten() {
            match reserved {
                Reserved::Owned(slot) => reclaimed.push(slot),
                Reserved::Retired(arc) => match Arc::try_unwrap(arc) {
                    Ok(slot) => reclaimed.push(slot),
                    Err(arc) => retired.push(RetiredSlot::new(arc)),
                },
            }
        }
        (reclaimed, retired)
    }
}

/// Type-erased `Arc<Slot<R>>`, so retired slots of any root type can wait
/// in one list.
trait Reclaim: Send {
    fn slot_index(&self) -> u8;
    fn try_reclaim(self: Box<Self>) -> Result<Arena, Box<dyn Reclaim>>;
}

impl<R: Send + Sync + 'static> Reclaim for Arc<Slot<R>> {
    fn slot_index(&self) -> u8 {
        self.index
    }

    fn try_reclaim(self: Box<Self>) -> Result<Arena, Box<dyn Reclaim>> {
        match Arc::try_unwrap(*self) {
            Ok(slot) => Ok(slot.into_arena()),
            Err(arc) => Err(Box::new(arc)),
        }
    }
}

/// A slot that readers still pinned when its pair was dismantled.
///
/// Holds the writer's reference until the last [`Pinned`] goes away;
/// [`try_reclaim`](RetiredSlot::try_reclaim) then hands the arena back so
/// its region can return to the provider.
pub struct RetiredSlot {
    inner: Box<dyn Reclaim>,
}

impl RetiredSlot {
    fn new<R: Send + Sync + 'static>(slot: Arc<Slot<R>>) -> Self {
        Self {
            inner: Box::new(slot),
        }
    }

    /// Index (0 or 1) of the slot within its former pair.
    pub fn slot_index(&self) -> u8 {
        self.inner.slot_index()
    }

    /// The slot's arena if no reader pins it any more, otherwise the slot
    /// itself back.
    pub fn try_reclaim(self) -> Result<Arena, Self> {
        self.inner.try_reclaim().map_err(|inner| Self { inner })
    }
}

impl std::fmt::Debug for RetiredSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetiredSlot")
            .field("index", &self.slot_index())
            .finish()
    }
}

impl<R> std::fmt::Debug for SlotPair<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotPair")
            .field("current", &self.current_index())
            .field("reserved_pinned", &self.reserved_is_pinned())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_arena::Region;

    fn slot(index: u8, root: Option<u64>, generation: u64) -> Slot<u64> {
        let mut s = Slot::new(index, Arena::new(Region::zeroed(64)).unwrap());
        if let Some(r) = root {
            s.complete(r, generation);
        }
        s
    }

    #[test]
    fn invalid_published_slot_reads_as_none() {
        let pair = SlotPair::new(slot(0, None, 0), slot(1, None, 0));
        assert!(pair.reader().get_current().is_none());
        assert_eq!(pair.current_index(), Some(0));
    }

    #[test]
    fn flip_publishes_reserved_and_reclaims_old() {
        let mut pair = SlotPair::new(slot(0, Some(10), 1), slot(1, Some(20), 2));
        let reader = pair.reader();
        assert_eq!(*reader.get_current().unwrap().root(), 10);

        assert!(pair.flip());
        assert_eq!(pair.current_index(), Some(1));
        assert_eq!(*reader.get_current().unwrap().root(), 20);
        assert_eq!(pair.reserved_mut().map(|s| s.index()), Some(0));
    }

    #[test]
    fn pinned_slot_blocks_reclaim_until_dropped() {
        let mut pair = SlotPair::new(slot(0, Some(10), 1), slot(1, Some(20), 2));
        let reader = pair.reader();
        let pin = reader.get_current().unwrap();

        assert!(pair.flip());
        assert!(pair.reserved_is_pinned());
        assert!(pair.reserved_mut().is_none());
        assert!(!pair.flip());
        // The pin still sees its own generation.
        assert_eq!(*pin.root(), 10);
        assert_eq!(pin.slot_index(), 0);

        drop(pin);
        assert!(!pair.reserved_is_pinned());
        assert_eq!(pair.reserved_mut().map(|s| s.index()), Some(0));
    }

    #[test]
    fn begin_rebuild_resets_the_arena() {
        let mut s = slot(0, Some(1), 1);
        s.arena.allocate(16).unwrap();
        let (arena, previous) = s.begin_rebuild();
        assert_eq!(arena.used(), 0);
        assert_eq!(previous, Some(1));
        assert!(s.root().is_none());
        assert!(s.is_valid());
    }

    #[test]
    fn dismantle_unpublishes_and_retires_pinned_slots() {
        let pair = SlotPair::new(slot(0, Some(10), 1), slot(1, Some(20), 2));
        let reader = pair.reader();
        let pin = reader.get_current().unwrap();
        let (slots, mut retired) = pair.dismantle();
        assert_eq!(slots.len(), 1);
        assert_eq!(retired.len(), 1);
        assert!(reader.get_current().is_none());
        assert_eq!(*pin.root(), 10);

        let held = retired.pop().unwrap();
        assert_eq!(held.slot_index(), 0);
        let held = held.try_reclaim().unwrap_err();
        drop(pin);
        let arena = held.try_reclaim().unwrap();
        assert_eq!(arena.region_len(), 64);
    }
}
