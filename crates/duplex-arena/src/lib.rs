//! Offset-addressed bump arena and arena-resident containers.
//!
//! An [`Arena`] turns a host-supplied [`Region`] of bytes into a bump
//! allocator with no individual free. Everything built on top of it
//! ([`Array`], [`HashTable`], length-prefixed strings) lives entirely
//! inside that region and links to other allocations by byte offset,
//! never by native pointer, so a region stays valid wherever it is mapped.
//!
//! # Layout
//!
//! ```text
//! Region (host-owned bytes)
//! ├── header (16 bytes: magic, layout version, capacity)
//! └── bump space [base .. limit)
//!     ├── Array header + elements        (one allocation)
//!     ├── HashTable header + bucket heads (one allocation)
//!     ├── table nodes { next, data }      (one allocation each)
//!     └── strings { len, cap, bytes }     (one allocation each)
//! ```
//!
//! Offset `0` always falls inside the header, so it doubles as the null
//! link for bucket chains and optional handles.
//!
//! # Failure model
//!
//! Allocation failure is a signal, not a panic: [`Arena::allocate`] returns
//! `None` and latches [`Arena::out_of_memory`]. Callers abort whatever they
//! were building and [`Arena::reset`] the arena before the next attempt.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod arena;
pub mod array;
pub mod error;
pub mod hash;
pub mod ptr;
pub mod record;
pub mod region;
pub mod table;

pub use arena::Arena;
pub use array::Array;
pub use error::ArenaError;
pub use hash::fnv1a;
pub use ptr::{ArenaBytes, ArenaPtr, ArenaStr};
pub use record::Record;
pub use region::{HeapRegionProvider, Region, RegionError, RegionProvider};
pub use table::{HashTable, TableOps};
