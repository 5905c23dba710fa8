//! Host-supplied byte regions and the provider interface that hands them out.
//!
//! The arena never allocates its own backing memory. A [`RegionProvider`]
//! (the host's slab, a shared mapping, or the bundled
//! [`HeapRegionProvider`]) supplies a [`Region`] per slot, and receives it
//! back when the owning application is unregistered.

use std::error::Error;
use std::fmt;

/// A contiguous, zero-initialised block of bytes owned by the host.
pub struct Region {
    bytes: Box<[u8]>,
}

impl Region {
    /// Create a zero-filled region of `size` bytes on the heap.
    pub fn zeroed(size: usize) -> Self {
        Self {
            bytes: vec![0u8; size].into_boxed_slice(),
        }
    }

    /// Size of the region in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the region has zero length.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Shared view of the bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutable view of the bytes.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl From<Vec<u8>> for Region {
    fn from(bytes: Vec<u8>) -> Self {
        Self {
            bytes: bytes.into_boxed_slice(),
        }
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region").field("len", &self.len()).finish()
    }
}

/// Errors reported by a [`RegionProvider`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegionError {
    /// The provider's byte budget cannot cover the request.
    BudgetExhausted {
        /// Bytes requested.
        requested: usize,
        /// Bytes still available in the budget.
        remaining: usize,
    },
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BudgetExhausted {
                requested,
                remaining,
            } => write!(
                f,
                "region budget exhausted: requested {requested} bytes, {remaining} bytes remaining"
            ),
        }
    }
}

impl Error for RegionError {}

/// Source of backing memory for slot arenas.
///
/// Regions must stay valid for as long as the application that acquired
/// them is registered. The provider gets each region back through
/// [`release`](RegionProvider::release) exactly once.
pub trait RegionProvider: Send {
    /// Hand out a zero-initialised region of exactly `size` bytes.
    fn acquire(&mut self, size: usize) -> Result<Region, RegionError>;

    /// Take back a region previously returned by [`acquire`](RegionProvider::acquire).
    fn release(&mut self, region: Region);
}

/// Heap-backed provider with an optional total byte budget.
///
/// Without a budget every request succeeds. With one, requests that would
/// push the outstanding total past the budget fail, which models a bounded
/// shared-memory slab.
#[derive(Debug, Default)]
pub struct HeapRegionProvider {
    budget: Option<usize>,
    outstanding: usize,
}

impl HeapRegionProvider {
    /// Provider with no byte budget.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider that refuses to hand out more than `budget` bytes in total.
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget: Some(budget),
            outstanding: 0,
        }
    }

    /// Bytes currently handed out and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

impl RegionProvider for HeapRegionProvider {
    fn acquire(&mut self, size: usize) -> Result<Region, RegionError> {
        if let Some(budget) = self.budget {
            let remaining = budget.saturating_sub(self.outstanding);
            if size > remaining {
                return Err(RegionError::BudgetExhausted {
                    requested: size,
                    remaining,
                });
            }
        }
        self.outstanding += size;
        Ok(Region::zeroed(size))
    }

    fn release(&mut self, region: Region) {
        self.outstanding = self.outstanding.saturating_sub(region.len());
    }
}
