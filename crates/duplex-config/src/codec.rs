//! Little-endian primitives shared by the blob header and payload codecs.
//!
//! Writers append to any `Write` sink. Reading goes through
//! [`ByteReader`], a cursor over a borrowed slice whose every read checks
//! the remaining length first, so malformed input surfaces as
//! [`BlobError::Truncated`] instead of a panic.

use std::io::{self, Write};

use crate::error::BlobError;

// ── Primitive writers ───────────────────────────────────────────

/// Write a little-endian u32.
pub fn write_u32_le(w: &mut dyn Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

/// Write a little-endian u64.
pub fn write_u64_le(w: &mut dyn Write, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

/// Write a length-prefixed UTF-8 string (u32 length + bytes).
pub fn write_length_prefixed_str(w: &mut dyn Write, s: &str) -> io::Result<()> {
    let len = u32::try_from(s.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "string longer than u32::MAX"))?;
    write_u32_le(w, len)?;
    w.write_all(s.as_bytes())
}

/// Write a collection length as a u32 count.
pub fn write_count(w: &mut dyn Write, n: usize) -> io::Result<()> {
    let n = u32::try_from(n)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "count exceeds u32::MAX"))?;
    write_u32_le(w, n)
}

// ── Bounds-checked reader ───────────────────────────────────────

/// Cursor over a byte slice.
#[derive(Clone, Debug)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Start reading at the beginning of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Current offset from the start of the slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Consume exactly `n` bytes.
    pub fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], BlobError> {
        let available = self.remaining();
        if n > available {
            return Err(BlobError::Truncated {
                what,
                needed: n,
                available,
            });
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], BlobError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    /// Read a little-endian u32.
    pub fn u32(&mut self, what: &'static str) -> Result<u32, BlobError> {
        self.array(what).map(u32::from_le_bytes)
    }

    /// Read a little-endian u64.
    pub fn u64(&mut self, what: &'static str) -> Result<u64, BlobError> {
        self.array(what).map(u64::from_le_bytes)
    }

    /// Read four raw bytes.
    pub fn bytes4(&mut self, what: &'static str) -> Result<[u8; 4], BlobError> {
        self.array(what)
    }

    /// Read a length-prefixed UTF-8 string, borrowing from the buffer.
    pub fn str(&mut self, what: &'static str) -> Result<&'a str, BlobError> {
        let len = self.u32(what)? as usize;
        let raw = self.take(len, what)?;
        std::str::from_utf8(raw)
            .map_err(|e| BlobError::malformed(format!("{what} is not valid UTF-8: {e}")))
    }

    /// Read a u32 element count and check that at least `count * min_size`
    /// bytes remain, so a corrupt count cannot trigger a huge allocation.
    pub fn count(&mut self, what: &'static str, min_size: usize) -> Result<u32, BlobError> {
        let count = self.u32(what)?;
        let needed = (count as usize).saturating_mul(min_size);
        let available = self.remaining();
        if needed > available {
            return Err(BlobError::Truncated {
                what,
                needed,
                available,
            });
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_what_was_written() {
        let mut buf = Vec::new();
        write_u32_le(&mut buf, 7).unwrap();
        write_u64_le(&mut buf, u64::MAX - 1).unwrap();
        write_length_prefixed_str(&mut buf, "héllo").unwrap();
        write_count(&mut buf, 2).unwrap();

        let mut r = ByteReader::new(&buf);
        assert_eq!(r.u32("a").unwrap(), 7);
        assert_eq!(r.u64("b").unwrap(), u64::MAX - 1);
        assert_eq!(r.str("c").unwrap(), "héllo");
        assert_eq!(r.u32("d").unwrap(), 2);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn overrun_is_truncated_not_panic() {
        let mut r = ByteReader::new(&[1, 2, 3]);
        assert_eq!(
            r.u32("status").unwrap_err(),
            BlobError::Truncated {
                what: "status",
                needed: 4,
                available: 3,
            }
        );
        // A failed read consumes nothing.
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn string_length_past_end_is_truncated() {
        let mut buf = Vec::new();
        write_u32_le(&mut buf, 100).unwrap();
        buf.extend_from_slice(b"short");
        let err = ByteReader::new(&buf).str("name").unwrap_err();
        assert!(matches!(err, BlobError::Truncated { needed: 100, .. }));
    }

    #[test]
    fn absurd_count_is_rejected_up_front() {
        let mut buf = Vec::new();
        write_u32_le(&mut buf, u32::MAX).unwrap();
        let err = ByteReader::new(&buf).count("services", 8).unwrap_err();
        assert!(matches!(err, BlobError::Truncated { what: "services", .. }));
    }

    #[test]
    fn invalid_utf8_is_malformed() {
        let mut buf = Vec::new();
        write_u32_le(&mut buf, 2).unwrap();
        buf.extend_from_slice(&[0xff, 0xfe]);
        let err = ByteReader::new(&buf).str("name").unwrap_err();
        assert!(matches!(err, BlobError::Malformed { .. }));
    }
}
