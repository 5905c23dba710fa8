//! Arena-relative handles.
//!
//! Handles are byte offsets from the start of the arena's region. They are
//! `Copy`, carry no lifetime, and are meaningless without the [`Arena`]
//! that produced them. A handle resolved against a different arena (or
//! against the same arena after [`Arena::reset`]) reads whatever bytes now
//! live at that offset.
//!
//! [`Arena`]: crate::Arena
//! [`Arena::reset`]: crate::Arena::reset

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// A raw byte allocation: offset plus length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use]
pub struct ArenaBytes {
    pub(crate) offset: u32,
    pub(crate) len: u32,
}

impl ArenaBytes {
    /// Offset of the first byte within the region.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Length of the allocation in bytes.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// Whether this is a zero-length allocation.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last byte of the allocation.
    pub fn end(&self) -> u32 {
        self.offset + self.len
    }

    /// Reinterpret the start of this allocation as a typed record handle.
    pub fn cast<T>(self) -> ArenaPtr<T> {
        ArenaPtr::new(self.offset)
    }
}

/// Typed handle to a [`Record`](crate::Record) stored in the arena.
///
/// Dropping a handle leaves the record in place; the arena owns it until
/// the next reset.
pub struct ArenaPtr<T> {
    offset: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ArenaPtr<T> {
    pub(crate) const fn new(offset: u32) -> Self {
        Self {
            offset,
            _marker: PhantomData,
        }
    }

    /// Byte offset of the record within the region.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Handle to the record `index` elements after this one, for records
    /// of `size` bytes laid out contiguously.
    pub(crate) fn step(self, index: u32, size: u32) -> Self {
        Self::new(self.offset + index * size)
    }
}

impl<T> Clone for ArenaPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArenaPtr<T> {}

impl<T> PartialEq for ArenaPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
    }
}

impl<T> Eq for ArenaPtr<T> {}

impl<T> Hash for ArenaPtr<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.offset.hash(state);
    }
}

impl<T> fmt::Debug for ArenaPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ArenaPtr<{}>({:#x})", std::any::type_name::<T>(), self.offset)
    }
}

/// Handle to a length-prefixed string buffer.
///
/// Layout in the arena: `[len: u32][capacity: u32][bytes; capacity]`.
/// The empty handle (offset 0) denotes the empty string and owns no
/// storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[must_use]
pub struct ArenaStr {
    pub(crate) offset: u32,
}

impl ArenaStr {
    /// The empty string. Resolves to `""` in every arena.
    pub const EMPTY: Self = Self { offset: 0 };

    /// Size of the `len` + `capacity` prefix in bytes.
    pub const PREFIX_SIZE: u32 = 8;

    /// Whether this is the storage-free empty handle.
    pub fn is_empty_handle(&self) -> bool {
        self.offset == 0
    }

    /// Byte offset of the prefix within the region.
    pub fn offset(&self) -> u32 {
        self.offset
    }
}
