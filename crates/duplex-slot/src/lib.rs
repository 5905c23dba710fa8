//! Double-buffered arena slots and the tick-driven refresh driver.
//!
//! Each registered application gets two [`Slot`]s, each an
//! [`Arena`](duplex_arena::Arena) plus the root of a structure built in it.
//! Readers pin the *published* slot lock-free through a [`SlotReader`];
//! the single writer rebuilds the *reserved* slot on ticks and flips it in
//! when the rebuild succeeds.
//!
//! # Lifecycle
//!
//! ```text
//! register ──► both slots rebuilt ──► tick ──► tick ──► ... ──► unregister
//!                 (slot 0 published)    │                         (teardown once,
//!                                       ├─ pinned?  → skip        regions released)
//!                                       ├─ stale?   → NoUpdate
//!                                       ├─ rebuild  → failure keeps published slot
//!                                       └─ flip     → reserved becomes published
//! ```
//!
//! Nothing after registration is fatal: every tick outcome is reported as
//! a [`TickOutcome`], logged through `tracing`, and counted in
//! [`RefreshMetrics`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod app;
pub mod config;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod refresh_thread;
pub mod registry;
pub mod slot;

pub use app::{SlotApp, Staleness};
pub use config::{AppConfig, ConfigError};
pub use driver::{AppDiagnostics, RefreshDriver, SlotDiagnostics, TickOutcome};
pub use error::{RebuildError, RegisterError};
pub use metrics::RefreshMetrics;
pub use refresh_thread::RefreshThread;
pub use registry::{AppHandle, AppId, PollOutcomes, Registry};
pub use slot::{Pinned, RetiredSlot, Slot, SlotPair, SlotReader};
