//! In-process LRU backend.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;

use super::{BackendKind, CacheBackend, StoreError};
use crate::cache::keys::CacheKey;
use crate::cache::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store::memory";

struct MemoryEntry {
    content: Bytes,
    /// `None` when the TTL overflows `Instant`.
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

pub struct MemoryBackend {
    entries: RwLock<LruCache<CacheKey, MemoryEntry>>,
}

impl MemoryBackend {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.content.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &CacheKey, content: Bytes, ttl: Duration) -> Result<(), StoreError> {
        let entry = MemoryEntry {
            content,
            expires_at: Instant::now().checked_add(ttl),
        };
        rw_write(&self.entries, SOURCE, "set").put(key.clone(), entry);
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        rw_write(&self.entries, SOURCE, "clear").clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;
    use crate::cache::context::{Device, KeyDimensions};
    use crate::cache::keys::build_key;

    const TTL: Duration = Duration::from_secs(999_999);

    fn key(uri: &str) -> CacheKey {
        build_key(&KeyDimensions {
            device: Device::Mobile,
            language_id: 1,
            shop_id: 1,
            uri,
        })
    }

    fn capacity(value: usize) -> NonZeroUsize {
        NonZeroUsize::new(value).expect("non-zero capacity")
    }

    #[tokio::test]
    async fn roundtrip_and_clear() {
        let backend = MemoryBackend::new(capacity(8));
        let key = key("/category/5");

        backend
            .set(&key, Bytes::from_static(b"page"), TTL)
            .await
            .expect("write");
        assert_eq!(
            backend.get(&key).await.expect("read"),
            Some(Bytes::from_static(b"page"))
        );

        backend.clear().await.expect("clear");
        assert!(backend.get(&key).await.expect("read").is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn least_recently_used_entry_is_evicted() {
        let backend = MemoryBackend::new(capacity(2));
        let first = key("/a");
        let second = key("/b");
        let third = key("/c");

        backend.set(&first, Bytes::from_static(b"a"), TTL).await.expect("write");
        backend.set(&second, Bytes::from_static(b"b"), TTL).await.expect("write");
        backend.set(&third, Bytes::from_static(b"c"), TTL).await.expect("write");

        assert!(backend.get(&first).await.expect("read").is_none());
        assert!(backend.get(&second).await.expect("read").is_some());
        assert!(backend.get(&third).await.expect("read").is_some());
    }

    #[tokio::test]
    async fn expired_entry_is_dropped() {
        let backend = MemoryBackend::new(capacity(2));
        let key = key("/a");

        backend
            .set(&key, Bytes::from_static(b"a"), Duration::ZERO)
            .await
            .expect("write");

        assert!(backend.get(&key).await.expect("read").is_none());
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn recovers_from_poisoned_lock() {
        let backend = MemoryBackend::new(capacity(2));

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = backend
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        let key = key("/a");
        backend
            .set(&key, Bytes::from_static(b"a"), TTL)
            .await
            .expect("write");
        assert!(backend.get(&key).await.expect("read").is_some());
    }
}
