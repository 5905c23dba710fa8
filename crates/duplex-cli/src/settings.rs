//! TOML settings for `duplexctl watch`.
//!
//! ```toml
//! [app]
//! name = "routes"
//! reserved_bytes = 1048576
//! tick_interval_ms = 500
//! capacity_warn_percent = 90
//! force_rebuild_after_failed_checks = 5   # 0 never forces
//!
//! [limits]
//! max_services = 256
//! max_hosts = 256
//! ```
//!
//! Every key is optional.

use std::path::Path;
use std::time::Duration;
use std::{fmt, fs, io};

use duplex_config::DecodeLimits;
use duplex_slot::{AppConfig, ConfigError};
use serde::Deserialize;

/// Parsed settings file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchSettings {
    pub app: AppSection,
    pub limits: LimitsSection,
}

/// `[app]`: mirrors [`AppConfig`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppSection {
    pub name: String,
    pub reserved_bytes: usize,
    pub tick_interval_ms: u64,
    pub capacity_warn_percent: u8,
    pub force_rebuild_after_failed_checks: u32,
}

impl Default for AppSection {
    fn default() -> Self {
        let base = AppConfig::new("routes", 1024 * 1024);
        Self {
            name: base.name,
            reserved_bytes: base.reserved_bytes,
            tick_interval_ms: u64::try_from(base.tick_interval.as_millis()).unwrap_or(u64::MAX),
            capacity_warn_percent: base.capacity_warn_percent,
            force_rebuild_after_failed_checks: base.force_rebuild_after_failed_checks.unwrap_or(0),
        }
    }
}

/// `[limits]`: mirrors [`DecodeLimits`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsSection {
    pub max_services: u32,
    pub max_hosts: u32,
}

impl Default for LimitsSection {
    fn default() -> Self {
        let base = DecodeLimits::default();
        Self {
            max_services: base.max_services,
            max_hosts: base.max_hosts,
        }
    }
}

/// Failure to load a settings file.
#[derive(Debug)]
pub enum SettingsError {
    Io(io::Error),
    Parse(toml::de::Error),
    Invalid(ConfigError),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "cannot read settings: {e}"),
            Self::Parse(e) => write!(f, "cannot parse settings: {e}"),
            Self::Invalid(e) => write!(f, "invalid settings: {e}"),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::Invalid(e) => Some(e),
        }
    }
}

impl WatchSettings {
    /// Read and validate a settings file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = fs::read_to_string(path).map_err(SettingsError::Io)?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate settings text.
    pub fn from_toml_str(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = toml::from_str(text).map_err(SettingsError::Parse)?;
        settings
            .app_config()
            .validate()
            .map_err(SettingsError::Invalid)?;
        Ok(settings)
    }

    /// The registry configuration these settings describe.
    pub fn app_config(&self) -> AppConfig {
        let forced = match self.app.force_rebuild_after_failed_checks {
            0 => None,
            n => Some(n),
        };
        AppConfig::new(self.app.name.clone(), self.app.reserved_bytes)
            .with_tick_interval(Duration::from_millis(self.app.tick_interval_ms))
            .with_capacity_warn_percent(self.app.capacity_warn_percent)
            .with_forced_rebuild_after(forced)
    }

    pub fn limits(&self) -> DecodeLimits {
        DecodeLimits::new(self.limits.max_services, self.limits.max_hosts)
    }
}
