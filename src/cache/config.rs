//! Page cache configuration.
//!
//! Resolved from the `[cache]` section of `fpcache.toml` (see `crate::config`).

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use super::eligibility::DEFAULT_EXEMPT_CONTROLLERS;

// Far beyond the cadence at which content events clear the store.
pub const DEFAULT_TTL_SECONDS: u64 = 999_999;
pub const DEFAULT_DIRECTORY: &str = "var/fpcache";
pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Root directory of the `files` backend.
    pub directory: PathBuf,
    /// Nominal time-to-live of stored pages.
    pub ttl_seconds: u64,
    /// Maximum pages held by the `memory` backend.
    pub memory_capacity: usize,
    /// Development/profiling mode; disables serving and capturing.
    pub debug_mode: bool,
    /// Controllers that are never cached.
    pub exempt_controllers: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_DIRECTORY),
            ttl_seconds: DEFAULT_TTL_SECONDS,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            debug_mode: false,
            exempt_controllers: DEFAULT_EXEMPT_CONTROLLERS
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            directory: settings.directory.clone(),
            ttl_seconds: settings.ttl.as_secs(),
            memory_capacity: settings.memory_capacity.get(),
            debug_mode: settings.debug_mode,
            exempt_controllers: settings.exempt_controllers.clone(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}
