//! Per-application configuration and validation.
//!
//! [`AppConfig`] is the input to [`Registry::register`](crate::Registry::register).
//! [`validate()`](AppConfig::validate) runs before any region is acquired,
//! so a misconfigured application is refused without side effects.

use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};

use duplex_arena::Arena;

/// Configuration for one registered application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// Unique name, used in logs and diagnostics.
    pub name: String,
    /// Size of each of the two slot regions, in bytes (arena header included).
    pub reserved_bytes: usize,
    /// How often the registry ticks this application. Default: 1s.
    pub tick_interval: Duration,
    /// Arena usage above which a successful rebuild logs a capacity
    /// warning, in percent (`1..=100`). Default: 90.
    pub capacity_warn_percent: u8,
    /// Consecutive failed staleness checks after which the next tick
    /// rebuilds regardless. `None` never forces. Default: `Some(5)`.
    pub force_rebuild_after_failed_checks: Option<u32>,
}

impl AppConfig {
    /// Config with the given name and region size and default timing.
    pub fn new(name: impl Into<String>, reserved_bytes: usize) -> Self {
        Self {
            name: name.into(),
            reserved_bytes,
            ..Self::default()
        }
    }

    /// Builder-style override of [`tick_interval`](AppConfig::tick_interval).
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Builder-style override of [`capacity_warn_percent`](AppConfig::capacity_warn_percent).
    pub fn with_capacity_warn_percent(mut self, percent: u8) -> Self {
        self.capacity_warn_percent = percent;
        self
    }

    /// Builder-style override of the forced-rebuild threshold.
    pub fn with_forced_rebuild_after(mut self, failed_checks: Option<u32>) -> Self {
        self.force_rebuild_after_failed_checks = failed_checks;
        self
    }

    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.reserved_bytes <= Arena::HEADER_SIZE {
            return Err(ConfigError::RegionTooSmall {
                configured: self.reserved_bytes,
                required: Arena::HEADER_SIZE + 1,
            });
        }
        if u32::try_from(self.reserved_bytes).is_err() {
            return Err(ConfigError::RegionTooLarge {
                configured: self.reserved_bytes,
            });
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroTickInterval);
        }
        if Instant::now().checked_add(self.tick_interval).is_none() {
            return Err(ConfigError::TickIntervalTooLarge {
                interval: self.tick_interval,
            });
        }
        if !(1..=100).contains(&self.capacity_warn_percent) {
            return Err(ConfigError::InvalidWarnPercent {
                value: self.capacity_warn_percent,
            });
        }
        if self.force_rebuild_after_failed_checks == Some(0) {
            return Err(ConfigError::ZeroForcedRebuildThreshold);
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            reserved_bytes: 64 * 1024,
            tick_interval: Duration::from_secs(1),
            capacity_warn_percent: 90,
            force_rebuild_after_failed_checks: Some(5),
        }
    }
}

/// Errors detected by [`AppConfig::validate()`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    /// The name is empty or whitespace.
    EmptyName,
    /// The region cannot hold the arena header plus any payload.
    RegionTooSmall {
        /// The configured size.
        configured: usize,
        /// The minimum accepted size.
        required: usize,
    },
    /// The region exceeds the arena's `u32` offset space.
    RegionTooLarge {
        /// The configured size.
        configured: usize,
    },
    /// `tick_interval` is zero.
    ZeroTickInterval,
    /// `tick_interval` cannot be added to the clock.
    TickIntervalTooLarge {
        /// The configured interval.
        interval: Duration,
    },
    /// `capacity_warn_percent` is outside `1..=100`.
    InvalidWarnPercent {
        /// The invalid value.
        value: u8,
    },
    /// `force_rebuild_after_failed_checks` is `Some(0)`.
    ZeroForcedRebuildThreshold,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyName => write!(f, "app name must not be empty"),
            Self::RegionTooSmall {
                configured,
                required,
            } => write!(
                f,
                "reserved_bytes {configured} is below the minimum of {required}"
            ),
            Self::RegionTooLarge { configured } => {
                write!(f, "reserved_bytes {configured} exceeds the u32 offset space")
            }
            Self::ZeroTickInterval => write!(f, "tick_interval must be non-zero"),
            Self::TickIntervalTooLarge { interval } => {
                write!(f, "tick_interval {interval:?} overflows the clock")
            }
            Self::InvalidWarnPercent { value } => {
                write!(f, "capacity_warn_percent must be in 1..=100, got {value}")
            }
            Self::ZeroForcedRebuildThreshold => write!(
                f,
                "force_rebuild_after_failed_checks must be None or at least 1"
            ),
        }
    }
}

impl Error for ConfigError {}
