//! Arena-specific error types.

use std::error::Error;
use std::fmt;

/// Errors that can occur during arena operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArenaError {
    /// The region cannot even hold the arena header.
    TooSmall {
        /// Size of the region that was offered, in bytes.
        size: usize,
        /// Minimum size required, in bytes.
        required: usize,
    },
    /// The region is larger than offsets can address.
    TooLarge {
        /// Size of the region that was offered, in bytes.
        size: usize,
    },
    /// An allocation could not be satisfied from the remaining space.
    OutOfMemory {
        /// Number of bytes requested.
        requested: usize,
        /// Bytes still free when the request was made.
        remaining: usize,
    },
    /// A container rejected a push because it is already at capacity.
    ContainerFull {
        /// Capacity of the container.
        capacity: u32,
    },
    /// A string write exceeded the capacity reserved for it.
    StringOverflow {
        /// Length of the string that was written.
        len: usize,
        /// Capacity of the string buffer.
        capacity: u32,
    },
    /// The region does not carry a header written by this crate.
    BadHeader,
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooSmall { size, required } => {
                write!(
                    f,
                    "region too small: {size} bytes, at least {required} bytes required"
                )
            }
            Self::TooLarge { size } => {
                write!(f, "region too large: {size} bytes exceeds the u32 offset space")
            }
            Self::OutOfMemory {
                requested,
                remaining,
            } => {
                write!(
                    f,
                    "arena out of memory: requested {requested} bytes, {remaining} bytes remaining"
                )
            }
            Self::ContainerFull { capacity } => {
                write!(f, "container full at capacity {capacity}")
            }
            Self::StringOverflow { len, capacity } => {
                write!(f, "string of {len} bytes exceeds buffer capacity {capacity}")
            }
            Self::BadHeader => write!(f, "region header is missing or corrupt"),
        }
    }
}

impl Error for ArenaError {}
