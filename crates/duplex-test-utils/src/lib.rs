//! Test utilities and mock applications for duplex development.
//!
//! Provides mock [`SlotApp`](duplex_slot::SlotApp) implementations whose
//! behaviour a test can script and observe after registration, plus
//! routing-table fixtures for the loader.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod apps;
pub mod fixtures;

pub use apps::{CounterApp, CounterRoot, CallCounts, ScriptHandle, ScriptedApp};
pub use fixtures::{blob, n_services, sample_document, small_config};
