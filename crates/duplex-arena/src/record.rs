//! Fixed-size little-endian encoding for values stored in the arena.
//!
//! Every type placed in an [`Array`](crate::Array) or referenced from a
//! [`HashTable`](crate::HashTable) implements [`Record`]. Encodings are
//! byte-exact and unaligned, so records can sit at any offset.

use crate::ptr::{ArenaPtr, ArenaStr};

/// A value with a fixed-width byte encoding.
///
/// `encode` writes exactly `SIZE` bytes; `decode` reads exactly `SIZE`
/// bytes. Both receive slices of length `SIZE`.
pub trait Record: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Write the encoding into `out` (length `SIZE`).
    fn encode(&self, out: &mut [u8]);

    /// Read a value back from `bytes` (length `SIZE`).
    fn decode(bytes: &[u8]) -> Self;
}

// ── Field helpers ───────────────────────────────────────────────

/// Write a little-endian u32 at `at`.
#[inline]
pub fn put_u32(out: &mut [u8], at: usize, v: u32) {
    out[at..at + 4].copy_from_slice(&v.to_le_bytes());
}

/// Read a little-endian u32 at `at`.
#[inline]
pub fn get_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

/// Write a little-endian u64 at `at`.
#[inline]
pub fn put_u64(out: &mut [u8], at: usize, v: u64) {
    out[at..at + 8].copy_from_slice(&v.to_le_bytes());
}

/// Read a little-endian u64 at `at`.
#[inline]
pub fn get_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

// ── Primitive records ───────────────────────────────────────────

impl Record for u8 {
    const SIZE: usize = 1;

    fn encode(&self, out: &mut [u8]) {
        out[0] = *self;
    }

    fn decode(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

impl Record for bool {
    const SIZE: usize = 1;

    fn encode(&self, out: &mut [u8]) {
        out[0] = u8::from(*self);
    }

    fn decode(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

impl Record for u32 {
    const SIZE: usize = 4;

    fn encode(&self, out: &mut [u8]) {
        put_u32(out, 0, *self);
    }

    fn decode(bytes: &[u8]) -> Self {
        get_u32(bytes, 0)
    }
}

impl Record for u64 {
    const SIZE: usize = 8;

    fn encode(&self, out: &mut [u8]) {
        put_u64(out, 0, *self);
    }

    fn decode(bytes: &[u8]) -> Self {
        get_u64(bytes, 0)
    }
}

impl Record for i64 {
    const SIZE: usize = 8;

    fn encode(&self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[..8]);
        i64::from_le_bytes(buf)
    }
}

// ── Handle records ──────────────────────────────────────────────

impl<T> Record for ArenaPtr<T> {
    const SIZE: usize = 4;

    fn encode(&self, out: &mut [u8]) {
        put_u32(out, 0, self.offset());
    }

    fn decode(bytes: &[u8]) -> Self {
        ArenaPtr::new(get_u32(bytes, 0))
    }
}

/// `None` is encoded as offset 0, which never addresses a record.
impl<T> Record for Option<ArenaPtr<T>> {
    const SIZE: usize = 4;

    fn encode(&self, out: &mut [u8]) {
        put_u32(out, 0, self.map_or(0, |p| p.offset()));
    }

    fn decode(bytes: &[u8]) -> Self {
        match get_u32(bytes, 0) {
            0 => None,
            offset => Some(ArenaPtr::new(offset)),
        }
    }
}

impl Record for ArenaStr {
    const SIZE: usize = 4;

    fn encode(&self, out: &mut [u8]) {
        put_u32(out, 0, self.offset);
    }

    fn decode(bytes: &[u8]) -> Self {
        ArenaStr {
            offset: get_u32(bytes, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Record + PartialEq + std::fmt::Debug>(v: T) {
        let mut buf = vec![0u8; T::SIZE];
        v.encode(&mut buf);
        assert_eq!(T::decode(&buf), v);
    }

    #[test]
    fn primitives_are_little_endian() {
        let mut buf = [0u8; 4];
        0x0102_0304u32.encode(&mut buf);
        assert_eq!(buf, [0x04, 0x03, 0x02, 0x01]);
        roundtrip(u64::MAX - 7);
        roundtrip(-42i64);
        roundtrip(true);
    }

    #[test]
    fn null_optional_pointer_is_zero() {
        let mut buf = [0xffu8; 4];
        None::<ArenaPtr<u32>>.encode(&mut buf);
        assert_eq!(buf, [0, 0, 0, 0]);
        assert_eq!(Option::<ArenaPtr<u32>>::decode(&buf), None);
        roundtrip(Some(ArenaPtr::<u32>::new(40)));
    }
}
