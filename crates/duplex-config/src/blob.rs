//! The versioned, checksummed blob a producer publishes for the loader.
//!
//! # Layout
//!
//! ```text
//! offset 0:  u32 status            (1 = ready)
//! offset 4:  u64 version
//! offset 12: u32 type_tag          (ROUTING_TABLE_V1)
//! offset 16: [u8; 4] checksum      (CRC-32 of the payload, little-endian)
//! offset 20: u32 payload_length
//! offset 24: payload
//! ```
//!
//! Everything is little-endian. Bytes after the payload are ignored, so a
//! producer may overwrite a longer blob in place.

use std::io::{self, Write};

use crate::codec::{write_u32_le, write_u64_le, ByteReader};
use crate::error::BlobError;

/// Status word of a blob whose producer has finished writing it.
pub const STATUS_READY: u32 = 1;

/// Type tag of the routing-table payload, `"RTB1"` read as a big-endian word.
pub const ROUTING_TABLE_V1: u32 = 0x5254_4231;

/// Bytes covered by `{status, version}`.
pub const VERSION_HEADER_LEN: usize = 12;

/// Bytes before the payload.
pub const HEADER_LEN: usize = 24;

/// The fixed-size blob header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobHeader {
    /// Producer status word.
    pub status: u32,
    /// Monotonic version chosen by the producer.
    pub version: u64,
    /// Payload format tag.
    pub type_tag: u32,
    /// Stored CRC-32 of the payload.
    pub checksum: u32,
    /// Declared payload length in bytes.
    pub payload_length: u32,
}

/// `{status, version}` only, for freshness checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobVersion {
    /// Producer status word.
    pub status: u32,
    /// Monotonic version chosen by the producer.
    pub version: u64,
}

impl BlobVersion {
    /// Whether the producer has marked the blob ready.
    pub fn is_ready(&self) -> bool {
        self.status == STATUS_READY
    }
}

/// Read `{status, version}` without looking at the rest of the blob.
pub fn read_version(bytes: &[u8]) -> Result<BlobVersion, BlobError> {
    let mut r = ByteReader::new(bytes);
    Ok(BlobVersion {
        status: r.u32("status")?,
        version: r.u64("version")?,
    })
}

/// Validate a complete blob and return its header and payload.
///
/// Checks, in order: readiness, the type tag, that the declared payload
/// fits in the buffer, and the payload checksum.
pub fn parse(bytes: &[u8]) -> Result<(BlobHeader, &[u8]), BlobError> {
    let mut r = ByteReader::new(bytes);
    let header = BlobHeader {
        status: r.u32("status")?,
        version: r.u64("version")?,
        type_tag: r.u32("type tag")?,
        checksum: u32::from_le_bytes(r.bytes4("checksum")?),
        payload_length: r.u32("payload length")?,
    };
    if header.status != STATUS_READY {
        return Err(BlobError::NotReady {
            status: header.status,
        });
    }
    if header.type_tag != ROUTING_TABLE_V1 {
        return Err(BlobError::UnknownTypeTag {
            found: header.type_tag,
        });
    }
    let available = r.remaining();
    if header.payload_length as usize > available {
        return Err(BlobError::LengthOverrun {
            declared: header.payload_length,
            available,
        });
    }
    let payload = r.take(header.payload_length as usize, "payload")?;
    let computed = crc32fast::hash(payload);
    if computed != header.checksum {
        return Err(BlobError::ChecksumMismatch {
            stored: header.checksum,
            computed,
        });
    }
    Ok((header, payload))
}

/// Frame `payload` as a ready routing-table blob at `version`.
///
/// Fails with [`io::ErrorKind::InvalidInput`] when the payload is longer
/// than `u32::MAX` bytes.
pub fn encode_blob(version: u64, payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    write_blob(&mut out, version, payload)?;
    Ok(out)
}

/// Write `payload` framed as a ready routing-table blob at `version`.
pub fn write_blob(w: &mut dyn Write, version: u64, payload: &[u8]) -> io::Result<()> {
    write_header(
        w,
        &BlobHeader {
            status: STATUS_READY,
            version,
            type_tag: ROUTING_TABLE_V1,
            checksum: crc32fast::hash(payload),
            payload_length: payload_length(payload.len())?,
        },
    )?;
    w.write_all(payload)
}

fn payload_length(len: usize) -> io::Result<u32> {
    u32::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "payload longer than u32::MAX"))
}

/// Write a header as laid out in the module docs.
pub fn write_header(w: &mut dyn Write, header: &BlobHeader) -> io::Result<()> {
    write_u32_le(w, header.status)?;
    write_u64_le(w, header.version)?;
    write_u32_le(w, header.type_tag)?;
    w.write_all(&header.checksum.to_le_bytes())?;
    write_u32_le(w, header.payload_length)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_offsets_are_fixed() {
        let blob = encode_blob(0x0102_0304_0506_0708, b"abc").unwrap();
        assert_eq!(blob.len(), HEADER_LEN + 3);
        assert_eq!(&blob[0..4], &1u32.to_le_bytes());
        assert_eq!(&blob[4..12], &0x0102_0304_0506_0708u64.to_le_bytes());
        assert_eq!(&blob[12..16], &ROUTING_TABLE_V1.to_le_bytes());
        assert_eq!(&blob[16..20], &crc32fast::hash(b"abc").to_le_bytes());
        assert_eq!(&blob[20..24], &3u32.to_le_bytes());
        assert_eq!(&blob[24..], b"abc");
    }

    #[test]
    fn parse_accepts_what_encode_produces() {
        let blob = encode_blob(9, b"payload").unwrap();
        let (header, payload) = parse(&blob).unwrap();
        assert_eq!(header.version, 9);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn version_only_needs_twelve_bytes() {
        let blob = encode_blob(42, b"xyz").unwrap();
        let v = read_version(&blob[..VERSION_HEADER_LEN]).unwrap();
        assert!(v.is_ready());
        assert_eq!(v.version, 42);
        assert!(matches!(
            read_version(&blob[..11]),
            Err(BlobError::Truncated { .. })
        ));
    }

    #[test]
    fn flipped_payload_byte_fails_checksum() {
        let mut blob = encode_blob(1, b"payload").unwrap();
        blob[HEADER_LEN + 2] ^= 0x01;
        assert!(matches!(
            parse(&blob),
            Err(BlobError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn flipped_checksum_byte_fails_checksum() {
        let mut blob = encode_blob(1, b"payload").unwrap();
        blob[16] ^= 0x80;
        assert!(matches!(
            parse(&blob),
            Err(BlobError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn unknown_tag_and_overrun_are_rejected() {
        let mut blob = encode_blob(1, b"payload").unwrap();
        blob[12] = 0;
        assert!(matches!(parse(&blob), Err(BlobError::UnknownTypeTag { .. })));

        let mut blob = encode_blob(1, b"payload").unwrap();
        blob[20..24].copy_from_slice(&100u32.to_le_bytes());
        assert_eq!(
            parse(&blob).unwrap_err(),
            BlobError::LengthOverrun {
                declared: 100,
                available: 7,
            }
        );
    }

    #[test]
    fn not_ready_is_reported_before_anything_else() {
        let mut blob = encode_blob(1, b"payload").unwrap();
        blob[0..4].copy_from_slice(&0u32.to_le_bytes());
        blob[12] = 0;
        assert_eq!(parse(&blob).unwrap_err(), BlobError::NotReady { status: 0 });
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut blob = encode_blob(1, b"abc").unwrap();
        blob.extend_from_slice(b"stale tail from a longer blob");
        assert_eq!(parse(&blob).unwrap().1, b"abc");
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn oversize_payload_is_refused_not_truncated() {
        let err = payload_length(u32::MAX as usize + 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(payload_length(u32::MAX as usize).unwrap(), u32::MAX);
    }

    #[test]
    fn short_writer_error_is_returned() {
        let mut buf = [0u8; HEADER_LEN + 1];
        let mut w = &mut buf[..];
        let err = write_blob(&mut w, 1, b"payload").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);

        let mut buf = [0u8; HEADER_LEN + 7];
        let mut w = &mut buf[..];
        write_blob(&mut w, 1, b"payload").unwrap();
        assert_eq!(parse(&buf).unwrap().1, b"payload");
    }
}
