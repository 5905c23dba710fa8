//! Open-hashing map with a fixed bucket count and intrusive chains.
//!
//! A [`HashTable`] stores handles to records that live elsewhere in the same
//! arena; it never copies the records. Each insertion allocates an 8-byte
//! node `{ next, data }` and links it at the head of its bucket, so the
//! most recently added of several equal elements is found first.
//!
//! ```text
//! header: [bucket_count: u32][len: u32][head_0: u32] ... [head_{n-1}: u32]
//! node:   [next: u32][data: u32]          (0 = end of chain)
//! ```

use std::cmp::Ordering;
use std::marker::PhantomData;

use crate::arena::Arena;
use crate::error::ArenaError;
use crate::ptr::ArenaPtr;
use crate::record::{get_u32, put_u32, Record};

const HEADER_SIZE: u32 = 8;
const NODE_SIZE: usize = 8;

/// Hash and compare capability for a [`HashTable`].
///
/// `hash_element(e)` must equal `hash_key(k)` whenever
/// `compare(e, k) == Ordering::Equal`; otherwise lookups miss.
pub trait TableOps<T> {
    /// The lookup key type used by [`HashTable::get`] and [`HashTable::delete`].
    type Key: ?Sized;

    /// Hash of a stored element.
    fn hash_element(&self, arena: &Arena, element: &T) -> u64;

    /// Hash of a lookup key.
    fn hash_key(&self, key: &Self::Key) -> u64;

    /// Order `element` against `key`; `Equal` means the element matches.
    fn compare(&self, arena: &Arena, element: &T, key: &Self::Key) -> Ordering;
}

/// Handle to a fixed-bucket hash table of `T` record handles.
#[must_use]
pub struct HashTable<T> {
    header: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for HashTable<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for HashTable<T> {}

impl<T> PartialEq for HashTable<T> {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
    }
}

impl<T> Eq for HashTable<T> {}

impl<T> std::fmt::Debug for HashTable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HashTable<{}>({:#x})", std::any::type_name::<T>(), self.header)
    }
}

impl<T: Record> HashTable<T> {
    /// Allocate an empty table with `bucket_count` buckets.
    ///
    /// Returns `None` for a zero bucket count or when the arena cannot
    /// supply the header and bucket heads.
    pub fn new(arena: &mut Arena, bucket_count: u32) -> Option<Self> {
        if bucket_count == 0 {
            return None;
        }
        let total = HEADER_SIZE as usize + bucket_count as usize * 4;
        let bytes = arena.allocate(total)?;
        put_u32(arena.bytes_mut(bytes), 0, bucket_count);
        Some(Self {
            header: bytes.offset(),
            _marker: PhantomData,
        })
    }

    /// [`new`](HashTable::new) as a `Result`, for use with `?`.
    ///
    /// A zero bucket count is reported as a zero-capacity container.
    pub fn try_new(arena: &mut Arena, bucket_count: u32) -> Result<Self, ArenaError> {
        if bucket_count == 0 {
            return Err(ArenaError::ContainerFull { capacity: 0 });
        }
        let remaining = arena.remaining();
        Self::new(arena, bucket_count).ok_or(ArenaError::OutOfMemory {
            requested: HEADER_SIZE as usize + bucket_count as usize * 4,
            remaining,
        })
    }

    fn u32_at(arena: &Arena, offset: u32) -> u32 {
        arena.read(ArenaPtr::<u32>::new(offset))
    }

    fn set_u32_at(arena: &mut Arena, offset: u32, v: u32) {
        arena.write(ArenaPtr::<u32>::new(offset), &v);
    }

    /// Number of buckets, fixed at creation.
    pub fn bucket_count(&self, arena: &Arena) -> u32 {
        Self::u32_at(arena, self.header)
    }

    /// Number of linked elements.
    pub fn len(&self, arena: &Arena) -> u32 {
        Self::u32_at(arena, self.header + 4)
    }

    /// Whether the table holds no elements.
    pub fn is_empty(&self, arena: &Arena) -> bool {
        self.len(arena) == 0
    }

    fn head_slot(&self, arena: &Arena, hash: u64) -> u32 {
        let bucket = (hash % self.bucket_count(arena) as u64) as u32;
        self.header + HEADER_SIZE + bucket * 4
    }

    /// Link `element` into the table.
    ///
    /// Allocates one node from the arena; fails with
    /// [`ArenaError::OutOfMemory`] if that is not possible, leaving the
    /// table unchanged.
    pub fn add<O>(&self, arena: &mut Arena, ops: &O, element: ArenaPtr<T>) -> Result<(), ArenaError>
    where
        O: TableOps<T> + ?Sized,
    {
        let hash = ops.hash_element(arena, &arena.read(element));
        let slot = self.head_slot(arena, hash);
        let node = arena.try_allocate(NODE_SIZE)?;
        let head = Self::u32_at(arena, slot);
        let bytes = arena.bytes_mut(node);
        put_u32(bytes, 0, head);
        put_u32(bytes, 4, element.offset());
        Self::set_u32_at(arena, slot, node.offset());
        let len = self.len(arena);
        Self::set_u32_at(arena, self.header + 4, len + 1);
        Ok(())
    }

    /// First element in `key`'s bucket chain that compares equal to `key`.
    pub fn get<O>(&self, arena: &Arena, ops: &O, key: &O::Key) -> Option<ArenaPtr<T>>
    where
        O: TableOps<T> + ?Sized,
    {
        let mut node = Self::u32_at(arena, self.head_slot(arena, ops.hash_key(key)));
        while node != 0 {
            let data = ArenaPtr::<T>::new(Self::u32_at(arena, node + 4));
            if ops.compare(arena, &arena.read(data), key) == Ordering::Equal {
                return Some(data);
            }
            node = Self::u32_at(arena, node);
        }
        None
    }

    /// Decode the first element matching `key`.
    pub fn get_value<O>(&self, arena: &Arena, ops: &O, key: &O::Key) -> Option<T>
    where
        O: TableOps<T> + ?Sized,
    {
        self.get(arena, ops, key).map(|p| arena.read(p))
    }

    /// Unlink the first element matching `key`.
    ///
    /// Returns whether an element was removed; a missing key is not an
    /// error. The node's bytes are not reclaimed.
    pub fn delete<O>(&self, arena: &mut Arena, ops: &O, key: &O::Key) -> bool
    where
        O: TableOps<T> + ?Sized,
    {
        // `link` is the offset of the u32 that points at `node`: either the
        // bucket head or the previous node's `next` field.
        let mut link = self.head_slot(arena, ops.hash_key(key));
        let mut node = Self::u32_at(arena, link);
        while node != 0 {
            let data = ArenaPtr::<T>::new(Self::u32_at(arena, node + 4));
            if ops.compare(arena, &arena.read(data), key) == Ordering::Equal {
                let next = Self::u32_at(arena, node);
                Self::set_u32_at(arena, link, next);
                let len = self.len(arena);
                Self::set_u32_at(arena, self.header + 4, len - 1);
                return true;
            }
            link = node;
            node = Self::u32_at(arena, node);
        }
        false
    }

    /// Iterate over every linked element handle, bucket by bucket.
    pub fn iter<'a>(&self, arena: &'a Arena) -> impl Iterator<Item = ArenaPtr<T>> + 'a
    where
        T: 'a,
    {
        let heads = self.header + HEADER_SIZE;
        (0..self.bucket_count(arena)).flat_map(move |bucket| {
            let mut node = Self::u32_at(arena, heads + bucket * 4);
            std::iter::from_fn(move || {
                if node == 0 {
                    return None;
                }
                let data = ArenaPtr::<T>::new(Self::u32_at(arena, node + 4));
                node = Self::u32_at(arena, node);
                Some(data)
            })
        })
    }
}

impl<T> Record for HashTable<T> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::fnv1a;
    use crate::ptr::ArenaStr;
    use crate::region::Region;
    use proptest::prelude::*;

    /// (name, value) pair keyed by name.
    struct Entry;

    impl TableOps<(ArenaStr, u64)> for Entry {
        type Key = str;

        fn hash_element(&self, arena: &Arena, element: &(ArenaStr, u64)) -> u64 {
            fnv1a(arena.str(element.0).as_bytes())
        }

        fn hash_key(&self, key: &str) -> u64 {
            fnv1a(key.as_bytes())
        }

        fn compare(&self, arena: &Arena, element: &(ArenaStr, u64), key: &str) -> Ordering {
            arena.str(element.0).cmp(key)
        }
    }

    impl Record for (ArenaStr, u64) {
        const SIZE: usize = 12;

        fn encode(&self, out: &mut [u8]) {
            self.0.encode(&mut out[..4]);
            self.1.encode(&mut out[4..]);
        }

        fn decode(bytes: &[u8]) -> Self {
            (ArenaStr::decode(&bytes[..4]), u64::decode(&bytes[4..]))
        }
    }

    fn arena(size: usize) -> Arena {
        Arena::new(Region::zeroed(size)).unwrap()
    }

    fn insert(a: &mut Arena, t: HashTable<(ArenaStr, u64)>, name: &str, v: u64) {
        let s = a.alloc_str(name).unwrap();
        let p = a.alloc_value(&(s, v)).unwrap();
        t.add(a, &Entry, p).unwrap();
    }

    #[test]
    fn zero_buckets_is_rejected() {
        let mut a = arena(256);
        assert!(HashTable::<(ArenaStr, u64)>::new(&mut a, 0).is_none());
        assert_eq!(a.used(), 0);
    }

    #[test]
    fn add_get_delete() {
        let mut a = arena(4096);
        let t = HashTable::new(&mut a, 8).unwrap();
        insert(&mut a, t, "alpha", 1);
        insert(&mut a, t, "beta", 2);
        assert_eq!(t.len(&a), 2);
        assert_eq!(t.get_value(&a, &Entry, "alpha").map(|e| e.1), Some(1));
        assert_eq!(t.get_value(&a, &Entry, "beta").map(|e| e.1), Some(2));
        assert!(t.get(&a, &Entry, "gamma").is_none());

        assert!(t.delete(&mut a, &Entry, "alpha"));
        assert!(t.get(&a, &Entry, "alpha").is_none());
        assert!(!t.delete(&mut a, &Entry, "alpha"));
        assert_eq!(t.len(&a), 1);
    }

    #[test]
    fn most_recent_duplicate_wins_then_older_reappears() {
        let mut a = arena(4096);
        let t = HashTable::new(&mut a, 4).unwrap();
        insert(&mut a, t, "svc", 1);
        insert(&mut a, t, "svc", 2);
        assert_eq!(t.get_value(&a, &Entry, "svc").map(|e| e.1), Some(2));
        assert!(t.delete(&mut a, &Entry, "svc"));
        assert_eq!(t.get_value(&a, &Entry, "svc").map(|e| e.1), Some(1));
    }

    #[test]
    fn single_bucket_chains_everything() {
        let mut a = arena(4096);
        let t = HashTable::new(&mut a, 1).unwrap();
        for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
            insert(&mut a, t, name, i as u64);
        }
        // Delete from the middle of the chain.
        assert!(t.delete(&mut a, &Entry, "b"));
        let mut seen: Vec<u64> = t.iter(&a).map(|p| a.read(p).1).collect();
        seen.sort_unstable();
        assert_eq!(seen, [0, 2, 3]);
    }

    #[test]
    fn add_failure_leaves_table_unchanged() {
        let mut a = arena(Arena::HEADER_SIZE + 8 + 4 + 12 + 7);
        let t = HashTable::<(ArenaStr, u64)>::new(&mut a, 1).unwrap();
        let p = a.alloc_value(&(ArenaStr::EMPTY, 5)).unwrap();
        assert!(t.add(&mut a, &Entry, p).is_err());
        assert_eq!(t.len(&a), 0);
        assert!(t.get(&a, &Entry, "").is_none());
        assert!(a.out_of_memory());
    }

    proptest! {
        #[test]
        fn every_added_key_is_found(
            keys in prop::collection::hash_set("[a-z]{1,8}", 1..40),
            buckets in 1u32..17,
        ) {
            let mut a = arena(64 * 1024);
            let t = HashTable::new(&mut a, buckets).unwrap();
            for (i, k) in keys.iter().enumerate() {
                insert(&mut a, t, k, i as u64);
            }
            prop_assert_eq!(t.len(&a) as usize, keys.len());
            for k in &keys {
                let hit = t.get_value(&a, &Entry, k.as_str());
                prop_assert!(hit.is_some());
                prop_assert_eq!(a.str(hit.unwrap().0), k.as_str());
            }
            for k in &keys {
                prop_assert!(t.delete(&mut a, &Entry, k.as_str()));
                prop_assert!(t.get(&a, &Entry, k.as_str()).is_none());
            }
            prop_assert!(t.is_empty(&a));
        }
    }
}
