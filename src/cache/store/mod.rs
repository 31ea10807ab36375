//! Page storage.
//!
//! [`CacheBackend`] is the contract a concrete store fulfils. [`CacheStore`] wraps the
//! selected backend and applies the fail-open policy: read errors become misses and
//! write or clear errors are logged and dropped.

mod files;
mod memory;

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

pub use files::FileBackend;
pub use memory::MemoryBackend;

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";
const METRIC_STORE_FAILED: &str = "fpcache_store_failed_total";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt entry `{key}`: {reason}")]
    Corrupt { key: String, reason: &'static str },
}

/// Storage contract shared by every backend.
///
/// Implementations must tolerate concurrent `get`/`set` calls alongside a `clear`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// `Ok(None)` on a miss or an expired entry.
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, StoreError>;

    async fn set(&self, key: &CacheKey, content: Bytes, ttl: Duration) -> Result<(), StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;
}

/// Backends this build can open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendKind {
    #[default]
    Files,
    Memory,
}

impl BackendKind {
    pub const SUPPORTED: [BackendKind; 2] = [BackendKind::Files, BackendKind::Memory];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Memory => "memory",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Files => "File",
            Self::Memory => "In-process memory",
        }
    }

    /// Whether other processes see the same entries.
    pub fn is_shared(self) -> bool {
        match self {
            Self::Files => true,
            Self::Memory => false,
        }
    }

    /// Resolve a configured name, falling back to the default backend when the name
    /// is unset or not supported.
    pub fn resolve(name: Option<&str>) -> Self {
        let Some(name) = name.map(str::trim).filter(|name| !name.is_empty()) else {
            debug!(backend = Self::default().as_str(), "No backend configured, using default");
            return Self::default();
        };

        name.parse().unwrap_or_else(|err: UnsupportedBackend| {
            warn!(
                requested = %err.0,
                backend = Self::default().as_str(),
                "Unsupported page cache backend, falling back to default"
            );
            Self::default()
        })
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported backend `{0}`")]
pub struct UnsupportedBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnsupportedBackend;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::SUPPORTED
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnsupportedBackend(value.to_string()))
    }
}

/// Build the backend for `kind` from the cache settings.
pub fn open_backend(kind: BackendKind, config: &CacheConfig) -> Arc<dyn CacheBackend> {
    match kind {
        BackendKind::Files => Arc::new(FileBackend::new(config.directory.clone())),
        BackendKind::Memory => Arc::new(MemoryBackend::new(config.memory_capacity_non_zero())),
    }
}

/// Fail-open facade over the active backend.
pub struct CacheStore {
    backend: RwLock<Arc<dyn CacheBackend>>,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend: RwLock::new(backend),
        }
    }

    /// Open the store for a configured backend name.
    pub fn from_name(name: Option<&str>, config: &CacheConfig) -> Self {
        Self::new(open_backend(BackendKind::resolve(name), config))
    }

    pub fn backend(&self) -> Arc<dyn CacheBackend> {
        Arc::clone(&rw_read(&self.backend, SOURCE, "backend"))
    }

    pub fn kind(&self) -> BackendKind {
        self.backend().kind()
    }

    /// Swap the active backend, returning the previous one.
    pub fn replace(&self, backend: Arc<dyn CacheBackend>) -> Arc<dyn CacheBackend> {
        std::mem::replace(&mut *rw_write(&self.backend, SOURCE, "replace"), backend)
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let backend = self.backend();
        match backend.get(key).await {
            Ok(found) => found,
            Err(err) => {
                warn!(
                    backend = backend.kind().as_str(),
                    key = %key,
                    error = %err,
                    "Page cache read failed, treating as miss"
                );
                counter!(METRIC_STORE_FAILED, "op" => "get").increment(1);
                None
            }
        }
    }

    /// Returns whether the entry was written.
    pub async fn set(&self, key: &CacheKey, content: Bytes, ttl: Duration) -> bool {
        let backend = self.backend();
        match backend.set(key, content, ttl).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    backend = backend.kind().as_str(),
                    key = %key,
                    error = %err,
                    "Page cache write failed, entry dropped"
                );
                counter!(METRIC_STORE_FAILED, "op" => "set").increment(1);
                false
            }
        }
    }

    /// Returns whether the backend reported a successful clear.
    pub async fn clear(&self) -> bool {
        let backend = self.backend();
        match backend.clear().await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    backend = backend.kind().as_str(),
                    error = %err,
                    "Page cache clear failed"
                );
                counter!(METRIC_STORE_FAILED, "op" => "clear").increment(1);
                false
            }
        }
    }
}
