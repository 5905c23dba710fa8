//! Checksummed routing-table blobs, decoded into duplex slots.
//!
//! A producer publishes a [blob](crate::blob) (a small versioned header, a CRC-32,
//! and a payload describing services and virtual hosts) into a
//! lock-guarded [`BlobSource`]. On every refresh tick a [`RoutingApp`]
//! checks the blob's version, and when it is newer than the reserved slot,
//! validates the blob and decodes it into the slot's arena as a
//! [`RoutingTable`]. Readers resolve requests through a [`RoutingView`].
//!
//! ```text
//! RoutingDocument ──encode──► blob ──publish──► BlobSource
//!                                                   │ try_read (shared lock)
//!                                  ConfigLoader ◄───┘
//!                                       │ parse + decode
//!                                       ▼
//!                               RoutingTable in a slot arena ──► RoutingView
//! ```
//!
//! A blob that fails validation never reaches a slot: the tick reports a
//! rebuild failure and readers keep the previously published table.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod blob;
pub mod codec;
pub mod decode;
pub mod document;
pub mod error;
pub mod loader;
pub mod routing;
pub mod source;

pub use blob::{encode_blob, write_blob, BlobHeader, BlobVersion, ROUTING_TABLE_V1, STATUS_READY};
pub use decode::{decode_routing_table, DecodeLimits};
pub use document::{HostDoc, PathDoc, RoutingDocument, ServiceDoc, TagDoc, UpstreamDoc};
pub use error::{BlobError, LoadError};
pub use loader::{ConfigLoader, ReadMode, ReadOutcome, RoutingApp, VersionCheck};
pub use routing::{HostView, RoutingTable, RoutingView, ServiceView};
pub use source::{BlobRead, BlobSource, FileBlobSource, MemoryBlobSource};
