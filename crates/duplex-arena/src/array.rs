//! Fixed-capacity, arena-resident sequence.
//!
//! An [`Array`] is allocated once, header and element storage together,
//! and only ever grows by count up to the capacity chosen at creation.
//! The handle itself is a 4-byte offset, so arrays nest inside other
//! records.

use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::arena::Arena;
use crate::error::ArenaError;
use crate::ptr::ArenaPtr;
use crate::record::{get_u32, put_u32, Record};

/// Header layout: `[length: u32][capacity: u32][element_size: u32]`.
const HEADER_SIZE: u32 = 12;
const LEN_AT: usize = 0;
const CAP_AT: usize = 4;
const ELEM_AT: usize = 8;

/// Handle to a fixed-capacity array of `T` records.
///
/// All operations take the [`Arena`] the array was created in. Elements
/// are stored contiguously right after the header and are never freed
/// individually.
#[must_use]
pub struct Array<T> {
    header: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Array<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Array<T> {}

impl<T> PartialEq for Array<T> {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
    }
}

impl<T> Eq for Array<T> {}

impl<T> std::fmt::Debug for Array<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Array<{}>({:#x})", std::any::type_name::<T>(), self.header)
    }
}

impl<T: Record> Array<T> {
    fn from_header(header: u32) -> Self {
        Self {
            header,
            _marker: PhantomData,
        }
    }

    /// Allocate an empty array with room for `capacity` elements.
    ///
    /// Returns `None` if the arena cannot supply
    /// `header + capacity * T::SIZE` bytes (the arena's out-of-memory flag
    /// is latched in that case).
    pub fn new(arena: &mut Arena, capacity: u32) -> Option<Self> {
        let Some(total) = (capacity as usize)
            .checked_mul(T::SIZE)
            .and_then(|payload| payload.checked_add(HEADER_SIZE as usize))
        else {
            arena.mark_out_of_memory();
            return None;
        };
        let bytes = arena.allocate(total)?;
        let header = arena.bytes_mut(bytes);
        put_u32(header, CAP_AT, capacity);
        put_u32(header, ELEM_AT, T::SIZE as u32);
        Some(Self::from_header(bytes.offset()))
    }

    /// [`new`](Array::new) as a `Result`, for use with `?`.
    pub fn try_new(arena: &mut Arena, capacity: u32) -> Result<Self, ArenaError> {
        let remaining = arena.remaining();
        Self::new(arena, capacity).ok_or(ArenaError::OutOfMemory {
            requested: HEADER_SIZE as usize + capacity as usize * T::SIZE,
            remaining,
        })
    }

    fn field(&self, arena: &Arena, at: usize) -> u32 {
        arena.read(ArenaPtr::<u32>::new(self.header + at as u32))
    }

    fn set_len(&self, arena: &mut Arena, len: u32) {
        arena.write(ArenaPtr::<u32>::new(self.header + LEN_AT as u32), &len);
    }

    fn first(&self) -> ArenaPtr<T> {
        ArenaPtr::new(self.header + HEADER_SIZE)
    }

    /// Number of elements pushed so far.
    pub fn len(&self, arena: &Arena) -> u32 {
        self.field(arena, LEN_AT)
    }

    /// Whether no element has been pushed.
    pub fn is_empty(&self, arena: &Arena) -> bool {
        self.len(arena) == 0
    }

    /// Maximum number of elements.
    pub fn capacity(&self, arena: &Arena) -> u32 {
        self.field(arena, CAP_AT)
    }

    /// Size of one element in bytes, fixed at creation.
    pub fn element_size(&self, arena: &Arena) -> u32 {
        self.field(arena, ELEM_AT)
    }

    /// Reserve the next slot and return its (zeroed) handle.
    ///
    /// Returns `None` without changing the length when the array is full.
    pub fn push(&self, arena: &mut Arena) -> Option<ArenaPtr<T>> {
        self.push_n(arena, 1)
    }

    /// Reserve `count` contiguous slots, all or nothing.
    ///
    /// Returns the handle of the first reserved slot. Slots handed out by
    /// `push`/`push_n` are zeroed because the arena zeroed the whole array
    /// at creation and elements are never reused.
    pub fn push_n(&self, arena: &mut Arena, count: u32) -> Option<ArenaPtr<T>> {
        let len = self.len(arena);
        let new_len = len.checked_add(count)?;
        if new_len > self.capacity(arena) {
            return None;
        }
        self.set_len(arena, new_len);
        Some(self.first().step(len, T::SIZE as u32))
    }

    /// Push `value` as the next element.
    pub fn push_value(&self, arena: &mut Arena, value: &T) -> Result<ArenaPtr<T>, ArenaError> {
        let ptr = self.push(arena).ok_or_else(|| ArenaError::ContainerFull {
            capacity: self.capacity(arena),
        })?;
        arena.write(ptr, value);
        Ok(ptr)
    }

    /// Handle of the element at `index`, if it has been pushed.
    pub fn ptr(&self, arena: &Arena, index: u32) -> Option<ArenaPtr<T>> {
        (index < self.len(arena)).then(|| self.first().step(index, T::SIZE as u32))
    }

    /// Decode the element at `index`.
    pub fn get(&self, arena: &Arena, index: u32) -> Option<T> {
        self.ptr(arena, index).map(|p| arena.read(p))
    }

    /// Iterate over the pushed elements in order.
    pub fn iter<'a>(&self, arena: &'a Arena) -> impl Iterator<Item = T> + 'a
    where
        T: 'a,
    {
        let first = self.first();
        (0..self.len(arena)).map(move |i| arena.read(first.step(i, T::SIZE as u32)))
    }

    /// Reorder the pushed elements in place by `compare`.
    ///
    /// The sort is unstable. `compare` receives the arena so it can
    /// resolve strings and nested handles.
    pub fn sort_by<F>(&self, arena: &mut Arena, mut compare: F)
    where
        F: FnMut(&Arena, &T, &T) -> Ordering,
    {
        let mut items: Vec<T> = self.iter(arena).collect();
        {
            let view: &Arena = arena;
            items.sort_unstable_by(|a, b| compare(view, a, b));
        }
        let first = self.first();
        for (i, item) in items.iter().enumerate() {
            arena.write(first.step(i as u32, T::SIZE as u32), item);
        }
    }

    /// Binary-search for an element matching `key`.
    ///
    /// `compare(arena, key, element)` must order consistently with the
    /// comparator the array was last sorted by. Returns any matching
    /// element; the result is unspecified if the array is not sorted.
    pub fn search<K, F>(&self, arena: &Arena, key: &K, mut compare: F) -> Option<ArenaPtr<T>>
    where
        K: ?Sized,
        F: FnMut(&Arena, &K, &T) -> Ordering,
    {
        let first = self.first();
        let (mut lo, mut hi) = (0u32, self.len(arena));
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let ptr = first.step(mid, T::SIZE as u32);
            match compare(arena, key, &arena.read(ptr)) {
                Ordering::Equal => return Some(ptr),
                Ordering::Greater => lo = mid + 1,
                Ordering::Less => hi = mid,
            }
        }
        None
    }
}

impl<T> Record for Array<T> {
    const SIZE: usize = 4;

    fn encode(&self, out: &mut [u8]) {
        put_u32(out, 0, self.header);
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            header: get_u32(bytes, 0),
            _marker: PhantomData,
        }
    }
}
