//! Error types for blob validation and loading.

use std::fmt;
use std::io;

use duplex_arena::ArenaError;
use duplex_slot::RebuildError;

/// A blob failed structural validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobError {
    /// A read ran past the end of the buffer.
    Truncated {
        /// What was being read.
        what: &'static str,
        /// Bytes needed.
        needed: usize,
        /// Bytes left in the buffer.
        available: usize,
    },
    /// The blob's producer has not marked it ready.
    NotReady {
        /// The status word found.
        status: u32,
    },
    /// The type tag does not name a known payload format.
    UnknownTypeTag {
        /// The tag found.
        found: u32,
    },
    /// `payload_length` claims more bytes than the blob holds.
    LengthOverrun {
        /// Declared payload length.
        declared: u32,
        /// Bytes actually present after the header.
        available: usize,
    },
    /// The payload checksum does not match the stored one.
    ChecksumMismatch {
        /// Checksum stored in the header.
        stored: u32,
        /// Checksum computed over the payload.
        computed: u32,
    },
    /// The payload is well-framed but violates the routing schema.
    Malformed {
        /// Human-readable description of what went wrong.
        detail: String,
    },
}

impl BlobError {
    /// Shorthand for [`BlobError::Malformed`].
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::Malformed {
            detail: detail.into(),
        }
    }
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated {
                what,
                needed,
                available,
            } => write!(
                f,
                "truncated reading {what}: need {needed} bytes, {available} available"
            ),
            Self::NotReady { status } => write!(f, "blob not ready (status {status})"),
            Self::UnknownTypeTag { found } => write!(f, "unknown type tag {found:#010x}"),
            Self::LengthOverrun {
                declared,
                available,
            } => write!(
                f,
                "payload length {declared} exceeds the {available} bytes present"
            ),
            Self::ChecksumMismatch { stored, computed } => write!(
                f,
                "checksum mismatch: stored={stored:#010x}, computed={computed:#010x}"
            ),
            Self::Malformed { detail } => write!(f, "malformed payload: {detail}"),
        }
    }
}

impl std::error::Error for BlobError {}

/// Why a load attempt did not produce a routing table.
#[derive(Debug)]
pub enum LoadError {
    /// The source is locked by a writer; try again next tick.
    Contention,
    /// The blob failed validation or decoding.
    Corrupt(BlobError),
    /// The slot's arena or one of its containers ran out of room.
    Capacity(ArenaError),
    /// The blob is older than the last one loaded.
    Stale {
        /// Version found in the blob.
        found: u64,
        /// Version of the last successful load.
        last_loaded: u64,
    },
    /// The source could not be read.
    Io(io::Error),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contention => write!(f, "blob source is locked"),
            Self::Corrupt(e) => write!(f, "corrupt blob: {e}"),
            Self::Capacity(e) => write!(f, "slot capacity exceeded: {e}"),
            Self::Stale { found, last_loaded } => write!(
                f,
                "blob version {found} is older than last loaded version {last_loaded}"
            ),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Corrupt(e) => Some(e),
            Self::Capacity(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for LoadError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<BlobError> for LoadError {
    fn from(e: BlobError) -> Self {
        match e {
            // A producer mid-write is contention, not corruption.
            BlobError::NotReady { .. } => Self::Contention,
            other => Self::Corrupt(other),
        }
    }
}

impl From<ArenaError> for LoadError {
    fn from(e: ArenaError) -> Self {
        Self::Capacity(e)
    }
}

impl From<LoadError> for RebuildError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::Contention => RebuildError::Contention,
            LoadError::Corrupt(e) => RebuildError::corrupt(e.to_string()),
            LoadError::Capacity(e) => RebuildError::Capacity(e),
            stale @ LoadError::Stale { .. } => RebuildError::Source {
                detail: stale.to_string(),
            },
            LoadError::Io(e) => RebuildError::Source {
                detail: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_is_contention() {
        let e: LoadError = BlobError::NotReady { status: 0 }.into();
        assert!(matches!(e, LoadError::Contention));
        assert_eq!(RebuildError::from(e), RebuildError::Contention);
    }

    #[test]
    fn checksum_mismatch_is_corrupt() {
        let e: LoadError = BlobError::ChecksumMismatch {
            stored: 1,
            computed: 2,
        }
        .into();
        let rebuild = RebuildError::from(e);
        assert!(matches!(rebuild, RebuildError::Corrupt { .. }));
        assert!(rebuild.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn container_full_is_capacity() {
        let e: LoadError = ArenaError::ContainerFull { capacity: 10 }.into();
        assert_eq!(
            RebuildError::from(e),
            RebuildError::Capacity(ArenaError::ContainerFull { capacity: 10 })
        );
    }
}
