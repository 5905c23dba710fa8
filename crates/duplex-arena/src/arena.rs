//! Bump allocator over a host-supplied byte region.
//!
//! An [`Arena`] reserves a small header at the start of its [`Region`] and
//! bump-allocates the rest. There is no per-allocation free: the only way
//! to reclaim space is [`Arena::reset`], which discards every allocation
//! at once.

use crate::error::ArenaError;
use crate::ptr::{ArenaBytes, ArenaPtr, ArenaStr};
use crate::record::{get_u32, put_u32, Record};
use crate::region::Region;

/// Magic bytes written at offset 0 of every formatted region.
const MAGIC: [u8; 4] = *b"DPXA";

/// Layout version written after the magic.
const LAYOUT_VERSION: u32 = 1;

/// Bump allocator over a fixed byte region.
///
/// Positions are byte offsets from the region start:
///
/// ```text
/// 0        HEADER_SIZE = base        cursor                limit
/// ├─ header ─┼──── allocated ─────────┼──── free ──────────────┤
/// ```
///
/// Invariant: `base <= cursor <= limit`. `out_of_memory` latches on the
/// first failed allocation and is only cleared by [`reset`](Arena::reset).
pub struct Arena {
    region: Region,
    base: u32,
    cursor: u32,
    limit: u32,
    out_of_memory: bool,
}

impl Arena {
    /// Bytes reserved at the start of the region for the arena header.
    pub const HEADER_SIZE: usize = 16;

    /// Format `region` as an empty arena.
    ///
    /// Fails with [`ArenaError::TooSmall`] if the region cannot hold the
    /// header, or [`ArenaError::TooLarge`] if it exceeds the `u32` offset
    /// space. The region's previous contents (beyond the header) are left
    /// in place; every allocation zero-fills before it is handed out.
    pub fn new(mut region: Region) -> Result<Self, ArenaError> {
        let size = region.len();
        if size < Self::HEADER_SIZE {
            return Err(ArenaError::TooSmall {
                size,
                required: Self::HEADER_SIZE,
            });
        }
        let limit = u32::try_from(size).map_err(|_| ArenaError::TooLarge { size })?;

        let header = &mut region.as_mut_slice()[..Self::HEADER_SIZE];
        header[..4].copy_from_slice(&MAGIC);
        put_u32(header, 4, LAYOUT_VERSION);
        put_u32(header, 8, limit);
        put_u32(header, 12, 0);

        Ok(Self {
            region,
            base: Self::HEADER_SIZE as u32,
            cursor: Self::HEADER_SIZE as u32,
            limit,
            out_of_memory: false,
        })
    }

    /// Re-open a region that was previously formatted by [`Arena::new`].
    ///
    /// The header is checked, and the arena comes back empty (cursor at
    /// base); earlier allocations are not recoverable.
    pub fn reattach(region: Region) -> Result<Self, ArenaError> {
        let bytes = region.as_slice();
        if bytes.len() < Self::HEADER_SIZE
            || bytes[..4] != MAGIC
            || get_u32(bytes, 4) != LAYOUT_VERSION
            || get_u32(bytes, 8) as usize != bytes.len()
        {
            return Err(ArenaError::BadHeader);
        }
        Self::new(region)
    }

    /// Give the region back, ending the arena.
    pub fn into_region(self) -> Region {
        self.region
    }

    // ── Allocation ──────────────────────────────────────────────

    /// Bump-allocate `len` zero-filled bytes.
    ///
    /// Returns `None` and latches [`out_of_memory`](Arena::out_of_memory)
    /// if fewer than `len` bytes remain. Never allocates partially.
    pub fn allocate(&mut self, len: usize) -> Option<ArenaBytes> {
        let remaining = self.limit - self.cursor;
        let len = match u32::try_from(len) {
            Ok(len) if len <= remaining => len,
            _ => {
                self.out_of_memory = true;
                return None;
            }
        };
        let start = self.cursor;
        let end = start + len;
        self.region.as_mut_slice()[start as usize..end as usize].fill(0);
        self.cursor = end;
        Some(ArenaBytes { offset: start, len })
    }

    /// [`allocate`](Arena::allocate) as a `Result`, for use with `?`.
    pub fn try_allocate(&mut self, len: usize) -> Result<ArenaBytes, ArenaError> {
        let remaining = self.remaining();
        self.allocate(len).ok_or(ArenaError::OutOfMemory {
            requested: len,
            remaining,
        })
    }

    /// Allocate room for one zeroed record and return its handle.
    pub fn alloc_record<T: Record>(&mut self) -> Result<ArenaPtr<T>, ArenaError> {
        Ok(self.try_allocate(T::SIZE)?.cast())
    }

    /// Allocate a record and initialise it with `value`.
    pub fn alloc_value<T: Record>(&mut self, value: &T) -> Result<ArenaPtr<T>, ArenaError> {
        let ptr = self.alloc_record::<T>()?;
        self.write(ptr, value);
        Ok(ptr)
    }

    /// Allocate a length-prefixed string buffer with room for `capacity`
    /// bytes. Its length starts at 0; fill it with
    /// [`write_str`](Arena::write_str).
    pub fn allocate_string(&mut self, capacity: usize) -> Option<ArenaStr> {
        let capacity32 = u32::try_from(capacity).ok();
        let total = capacity.checked_add(ArenaStr::PREFIX_SIZE as usize);
        let (Some(capacity32), Some(total)) = (capacity32, total) else {
            self.out_of_memory = true;
            return None;
        };
        let bytes = self.allocate(total)?;
        put_u32(self.region.as_mut_slice(), bytes.offset as usize + 4, capacity32);
        Some(ArenaStr {
            offset: bytes.offset,
        })
    }

    /// Allocate a string buffer sized for `s` and copy `s` into it.
    ///
    /// The empty string needs no storage and always succeeds.
    pub fn alloc_str(&mut self, s: &str) -> Result<ArenaStr, ArenaError> {
        if s.is_empty() {
            return Ok(ArenaStr::EMPTY);
        }
        let remaining = self.remaining();
        let handle = self
            .allocate_string(s.len())
            .ok_or(ArenaError::OutOfMemory {
                requested: s.len() + ArenaStr::PREFIX_SIZE as usize,
                remaining,
            })?;
        self.write_str(handle, s)?;
        Ok(handle)
    }

    /// Replace the contents of a string buffer.
    ///
    /// Fails with [`ArenaError::StringOverflow`] if `s` is longer than the
    /// capacity the buffer was allocated with.
    pub fn write_str(&mut self, handle: ArenaStr, s: &str) -> Result<(), ArenaError> {
        let capacity = self.str_capacity(handle);
        if s.len() > capacity as usize {
            return Err(ArenaError::StringOverflow {
                len: s.len(),
                capacity,
            });
        }
        if handle.is_empty_handle() {
            return Ok(());
        }
        let at = handle.offset as usize;
        let data = at + ArenaStr::PREFIX_SIZE as usize;
        let bytes = self.region.as_mut_slice();
        bytes[data..data + s.len()].copy_from_slice(s.as_bytes());
        put_u32(bytes, at, s.len() as u32);
        Ok(())
    }

    /// Latch the out-of-memory flag for a request that could never be
    /// represented (size arithmetic overflowed before reaching the arena).
    pub(crate) fn mark_out_of_memory(&mut self) {
        self.out_of_memory = true;
    }

    /// Discard every allocation.
    ///
    /// Moves the cursor back to the base and clears the out-of-memory
    /// flag. Previous contents are NOT zeroed here; each allocation zeroes
    /// its own bytes when it is handed out.
    pub fn reset(&mut self) {
        self.cursor = self.base;
        self.out_of_memory = false;
    }

    // ── Access ──────────────────────────────────────────────────

    /// Decode the record at `ptr`.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` addresses bytes outside the region, which can only
    /// happen with a handle from a different arena.
    pub fn read<T: Record>(&self, ptr: ArenaPtr<T>) -> T {
        let at = ptr.offset() as usize;
        T::decode(&self.region.as_slice()[at..at + T::SIZE])
    }

    /// Encode `value` over the record at `ptr`.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` addresses bytes outside the region.
    pub fn write<T: Record>(&mut self, ptr: ArenaPtr<T>, value: &T) {
        let at = ptr.offset() as usize;
        value.encode(&mut self.region.as_mut_slice()[at..at + T::SIZE]);
    }

    /// Borrow the bytes of a raw allocation.
    pub fn bytes(&self, bytes: ArenaBytes) -> &[u8] {
        &self.region.as_slice()[bytes.offset as usize..bytes.end() as usize]
    }

    /// Mutably borrow the bytes of a raw allocation.
    pub fn bytes_mut(&mut self, bytes: ArenaBytes) -> &mut [u8] {
        &mut self.region.as_mut_slice()[bytes.offset as usize..bytes.end() as usize]
    }

    /// Resolve a string handle.
    ///
    /// Returns `""` for the empty handle and for buffers whose contents are
    /// not valid UTF-8 (which [`write_str`](Arena::write_str) never produces).
    pub fn str(&self, handle: ArenaStr) -> &str {
        if handle.is_empty_handle() {
            return "";
        }
        let at = handle.offset as usize;
        let bytes = self.region.as_slice();
        let len = get_u32(bytes, at) as usize;
        let data = at + ArenaStr::PREFIX_SIZE as usize;
        std::str::from_utf8(&bytes[data..data + len]).unwrap_or("")
    }

    /// Capacity of a string buffer in bytes (0 for the empty handle).
    pub fn str_capacity(&self, handle: ArenaStr) -> u32 {
        if handle.is_empty_handle() {
            return 0;
        }
        get_u32(self.region.as_slice(), handle.offset as usize + 4)
    }

    // ── Diagnostics ─────────────────────────────────────────────

    /// Bytes handed out since the last reset.
    pub fn used(&self) -> usize {
        (self.cursor - self.base) as usize
    }

    /// Bytes available for allocation when empty (region minus header).
    pub fn capacity(&self) -> usize {
        (self.limit - self.base) as usize
    }

    /// Bytes still free.
    pub fn remaining(&self) -> usize {
        (self.limit - self.cursor) as usize
    }

    /// Usage as a percentage of capacity, `0..=100`.
    ///
    /// An arena with no usable space reports 100.
    pub fn used_percent(&self) -> u8 {
        let capacity = self.capacity() as u64;
        if capacity == 0 {
            return 100;
        }
        (self.used() as u64 * 100 / capacity) as u8
    }

    /// Whether an allocation has failed since the last reset.
    pub fn out_of_memory(&self) -> bool {
        self.out_of_memory
    }

    /// Current cursor offset (start of the next allocation).
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Total size of the backing region in bytes, header included.
    pub fn region_len(&self) -> usize {
        self.region.len()
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("base", &self.base)
            .field("cursor", &self.cursor)
            .field("limit", &self.limit)
            .field("out_of_memory", &self.out_of_memory)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena(size: usize) -> Arena {
        Arena::new(Region::zeroed(size)).unwrap()
    }

    #[test]
    fn region_smaller_than_header_is_rejected() {
        let err = Arena::new(Region::zeroed(Arena::HEADER_SIZE - 1)).unwrap_err();
        assert_eq!(
            err,
            ArenaError::TooSmall {
                size: Arena::HEADER_SIZE - 1,
                required: Arena::HEADER_SIZE,
            }
        );
    }

    #[test]
    fn header_only_region_has_zero_capacity() {
        let mut a = arena(Arena::HEADER_SIZE);
        assert_eq!(a.capacity(), 0);
        assert_eq!(a.used_percent(), 100);
        assert!(a.allocate(0).is_some());
        assert!(a.allocate(1).is_none());
        assert!(a.out_of_memory());
    }

    #[test]
    fn allocations_are_zeroed_after_reset() {
        let mut a = arena(64);
        let first = a.allocate(8).unwrap();
        a.bytes_mut(first).fill(0xAB);
        a.reset();
        let again = a.allocate(8).unwrap();
        assert_eq!(again.offset(), first.offset());
        assert!(a.bytes(again).iter().all(|&b| b == 0));
    }

    #[test]
    fn failed_allocation_does_not_move_cursor() {
        let mut a = arena(32);
        a.allocate(10).unwrap();
        let before = a.cursor();
        assert!(a.allocate(7).is_none());
        assert_eq!(a.cursor(), before);
        assert!(a.out_of_memory());
        // Smaller request still fits; the flag stays latched.
        assert!(a.allocate(6).is_some());
        assert!(a.out_of_memory());
    }

    #[test]
    fn reset_clears_out_of_memory() {
        let mut a = arena(32);
        assert!(a.allocate(100).is_none());
        a.reset();
        assert!(!a.out_of_memory());
        assert_eq!(a.used(), 0);
    }

    #[test]
    fn used_percent_tracks_cursor() {
        let mut a = arena(Arena::HEADER_SIZE + 200);
        assert_eq!(a.used_percent(), 0);
        a.allocate(50).unwrap();
        assert_eq!(a.used_percent(), 25);
        a.allocate(150).unwrap();
        assert_eq!(a.used_percent(), 100);
    }

    #[test]
    fn string_buffer_starts_empty_and_respects_capacity() {
        let mut a = arena(128);
        let s = a.allocate_string(5).unwrap();
        assert_eq!(a.str(s), "");
        assert_eq!(a.str_capacity(s), 5);
        a.write_str(s, "hello").unwrap();
        assert_eq!(a.str(s), "hello");
        assert_eq!(
            a.write_str(s, "hello!").unwrap_err(),
            ArenaError::StringOverflow {
                len: 6,
                capacity: 5,
            }
        );
        a.write_str(s, "hi").unwrap();
        assert_eq!(a.str(s), "hi");
    }

    #[test]
    fn empty_string_takes_no_space() {
        let mut a = arena(32);
        let s = a.alloc_str("").unwrap();
        assert_eq!(s, ArenaStr::EMPTY);
        assert_eq!(a.used(), 0);
        assert_eq!(a.str(s), "");
    }

    #[test]
    fn records_roundtrip_through_the_region() {
        let mut a = arena(64);
        let p = a.alloc_value(&0xDEAD_BEEF_u64).unwrap();
        assert_eq!(a.read(p), 0xDEAD_BEEF_u64);
        a.write(p, &7u64);
        assert_eq!(a.read(p), 7u64);
    }

    #[test]
    fn reattach_checks_the_header() {
        let a = arena(64);
        let region = a.into_region();
        let again = Arena::reattach(region).unwrap();
        assert_eq!(again.used(), 0);

        assert_eq!(
            Arena::reattach(Region::zeroed(64)).unwrap_err(),
            ArenaError::BadHeader
        );
    }
}
