//! Duplex: double-buffered, arena-backed configuration that workers read
//! lock-free while a single writer refreshes it on a tick.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all duplex sub-crates. For most users, adding `duplex` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use duplex::prelude::*;
//!
//! // A producer publishes a routing table as a checksummed blob.
//! let doc = RoutingDocument::new()
//!     .with_service("api", &[("10.0.0.1:80", 1), ("10.0.0.2:80", 3)])
//!     .with_host(HostDoc::new("example.com").default_service("api"));
//! let source = MemoryBlobSource::new(encode_blob(1, &doc.encode_payload().unwrap()).unwrap());
//!
//! // Register an app; both slots are built before `register` returns.
//! let mut registry = Registry::new();
//! let app = RoutingApp::new(source.clone(), DecodeLimits::default());
//! let handle = registry
//!     .register(AppConfig::new("routes", 64 * 1024), app)
//!     .unwrap();
//!
//! // Readers pin the published slot and resolve requests.
//! let pinned = handle.get_current().unwrap();
//! let view = RoutingView::of(&pinned);
//! assert_eq!(view.route("example.com", "/", &[]).unwrap().name(), "api");
//!
//! // A newer blob is picked up on the next tick.
//! source.publish(encode_blob(2, &doc.encode_payload().unwrap()).unwrap());
//! assert!(registry.tick(handle.id()).unwrap().is_published());
//! assert_eq!(handle.get_current().unwrap().root().version, 2);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`arena`] | `duplex-arena` | Bump arena, `Array`, `HashTable`, region providers |
//! | [`slot`] | `duplex-slot` | Slot pairs, refresh driver, registry, refresh thread |
//! | [`config`] | `duplex-config` | Routing-table blobs, loader, blob sources |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Offset-addressed bump arena and arena-resident containers (`duplex-arena`).
pub use duplex_arena as arena;

/// Double-buffered slots and the refresh driver (`duplex-slot`).
///
/// Implement [`slot::SlotApp`] to plug an application in, then register it
/// with a [`slot::Registry`].
pub use duplex_slot as slot;

/// Routing-table blobs and the loader that refreshes them (`duplex-config`).
pub use duplex_config as config;

/// Common imports for typical duplex usage.
pub mod prelude {
    // Arena
    pub use duplex_arena::{Arena, ArenaError, Array, HashTable, Record, TableOps};

    // Slots and driver
    pub use duplex_slot::{
        AppConfig, AppHandle, Pinned, RebuildError, RefreshThread, RegisterError, Registry,
        SlotApp, Staleness, TickOutcome,
    };

    // Routing configuration
    pub use duplex_config::{
        encode_blob, DecodeLimits, FileBlobSource, HostDoc, MemoryBlobSource, RoutingApp,
        RoutingDocument, RoutingTable, RoutingView,
    };
}
