//! Error types for rebuilds and registration.

use std::error::Error;
use std::fmt;

use duplex_arena::{ArenaError, RegionError};

use crate::config::ConfigError;

/// Why a rebuild of the reserved slot did not produce a root.
///
/// Every variant is recoverable: the driver logs it, leaves the published
/// slot untouched and tries again on a later tick.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RebuildError {
    /// The slot's arena (or a container in it) ran out of space.
    Capacity(ArenaError),
    /// The input was malformed or failed validation.
    Corrupt {
        /// Human-readable description of what was wrong.
        detail: String,
    },
    /// The input source was locked by someone else.
    Contention,
    /// The input source could not be read at all.
    Source {
        /// Human-readable description of the failure.
        detail: String,
    },
}

impl RebuildError {
    /// Shorthand for [`RebuildError::Corrupt`].
    pub fn corrupt(detail: impl Into<String>) -> Self {
        Self::Corrupt {
            detail: detail.into(),
        }
    }

    /// Whether the next tick is likely to succeed without any external
    /// change (lock contention only).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Contention)
    }
}

impl fmt::Display for RebuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capacity(e) => write!(f, "slot capacity exceeded: {e}"),
            Self::Corrupt { detail } => write!(f, "corrupt input: {detail}"),
            Self::Contention => write!(f, "input source is locked"),
            Self::Source { detail } => write!(f, "input source unavailable: {detail}"),
        }
    }
}

impl Error for RebuildError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Capacity(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for RebuildError {
    fn from(e: ArenaError) -> Self {
        Self::Capacity(e)
    }
}

/// Errors that make [`Registry::register`](crate::Registry::register) refuse
/// an application. Nothing is left registered when one of these is returned.
#[derive(Debug, PartialEq)]
pub enum RegisterError {
    /// The [`AppConfig`](crate::AppConfig) failed validation.
    InvalidConfig(ConfigError),
    /// An application with the same name is already registered.
    DuplicateName {
        /// The conflicting name.
        name: String,
    },
    /// The region provider could not supply a backing region.
    Region(RegionError),
    /// A backing region could not be formatted as an arena.
    Arena(ArenaError),
    /// The synchronous first rebuild of one of the two slots failed.
    InitialRebuild {
        /// Index of the slot whose rebuild failed (0 or 1).
        slot: u8,
        /// The rebuild failure.
        source: RebuildError,
    },
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(e) => write!(f, "invalid app config: {e}"),
            Self::DuplicateName { name } => write!(f, "app '{name}' is already registered"),
            Self::Region(e) => write!(f, "cannot acquire slot region: {e}"),
            Self::Arena(e) => write!(f, "cannot format slot arena: {e}"),
            Self::InitialRebuild { slot, source } => {
                write!(f, "initial rebuild of slot {slot} failed: {source}")
            }
        }
    }
}

impl Error for RegisterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidConfig(e) => Some(e),
            Self::Region(e) => Some(e),
            Self::Arena(e) => Some(e),
            Self::InitialRebuild { source, .. } => Some(source),
            Self::DuplicateName { .. } => None,
        }
    }
}

impl From<ConfigError> for RegisterError {
    fn from(e: ConfigError) -> Self {
        Self::InvalidConfig(e)
    }
}

impl From<RegionError> for RegisterError {
    fn from(e: RegionError) -> Self {
        Self::Region(e)
    }
}

impl From<ArenaError> for RegisterError {
    fn from(e: ArenaError) -> Self {
        Self::Arena(e)
    }
}
