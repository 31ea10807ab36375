//! Administrative operations: backend selection and manual clears.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::application::repos::{BACKEND_KEY, ConfigStore, ConfigStoreError};
use crate::cache::{
    BackendKind, InvalidationEventKind, PageCache, UnsupportedBackend, clear_manually, open_backend,
};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    UnsupportedBackend(#[from] UnsupportedBackend),
    #[error(transparent)]
    ConfigStore(#[from] ConfigStoreError),
}

/// One entry of the backend selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendOption {
    pub name: &'static str,
    pub title: &'static str,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub active: &'static str,
    pub supported: Vec<BackendOption>,
}

#[derive(Clone)]
pub struct AdminService {
    cache: Arc<PageCache>,
    config_store: Arc<dyn ConfigStore>,
    /// Runs outside the process that serves pages.
    detached: bool,
}

impl AdminService {
    /// Service embedded in the process that serves pages.
    pub fn new(cache: Arc<PageCache>, config_store: Arc<dyn ConfigStore>) -> Self {
        Self {
            cache,
            config_store,
            detached: false,
        }
    }

    /// Service running in its own process, such as the `fpcache` binary. Clears only
    /// reach the host through a shared backend.
    pub fn detached(cache: Arc<PageCache>, config_store: Arc<dyn ConfigStore>) -> Self {
        Self {
            cache,
            config_store,
            detached: true,
        }
    }

    /// Backend to open at startup. Read failures and unsupported names fall back to
    /// the default.
    pub async fn persisted_backend(config_store: &dyn ConfigStore) -> BackendKind {
        match config_store.get(BACKEND_KEY).await {
            Ok(name) => BackendKind::resolve(name.as_deref()),
            Err(err) => {
                warn!(
                    error = %err,
                    backend = BackendKind::default().as_str(),
                    "Failed to read persisted backend, using default"
                );
                BackendKind::default()
            }
        }
    }

    pub fn cache(&self) -> &Arc<PageCache> {
        &self.cache
    }

    pub fn backend_status(&self) -> BackendStatus {
        let active = self.cache.store().kind();
        BackendStatus {
            active: active.as_str(),
            supported: BackendKind::SUPPORTED
                .into_iter()
                .map(|kind| BackendOption {
                    name: kind.as_str(),
                    title: kind.title(),
                    active: kind == active,
                })
                .collect(),
        }
    }

    /// Persist `name`, switch the live store to it and clear the new backend.
    #[instrument(skip(self))]
    pub async fn set_backend(&self, name: &str) -> Result<BackendStatus, AdminError> {
        let kind: BackendKind = name.parse()?;
        self.config_store.set(BACKEND_KEY, kind.as_str()).await?;

        let store = self.cache.store();
        let previous = store.kind();
        if previous != kind {
            store.replace(open_backend(kind, self.cache.config()));
        }
        let cleared = clear_manually(store).await;

        info!(
            previous = previous.as_str(),
            backend = kind.as_str(),
            cleared,
            "Page cache backend selected"
        );
        Ok(self.backend_status())
    }

    /// Whether clearing the active backend affects the pages the host serves.
    pub fn reaches_host(&self) -> bool {
        !self.detached || self.cache.store().kind().is_shared()
    }

    /// Returns `false` without clearing when the active backend is private to this
    /// detached process.
    pub async fn clear_all(&self) -> bool {
        if !self.reaches_host() {
            self.warn_process_local("manual clear");
            return false;
        }
        clear_manually(self.cache.store()).await
    }

    /// Forward a content event to the invalidation hub, under the same rule as
    /// [`AdminService::clear_all`].
    pub async fn dispatch_event(&self, kind: InvalidationEventKind) -> bool {
        if !self.reaches_host() {
            self.warn_process_local(kind.as_str());
            return false;
        }
        self.cache.hub().on_event(kind).await
    }

    fn warn_process_local(&self, operation: &str) {
        warn!(
            backend = self.cache.store().kind().as_str(),
            operation,
            "Active backend is private to this process, host pages left untouched"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::cache::{CacheConfig, CacheStore, Device, KeyDimensions, build_key};
    use crate::infra::config_store::InMemoryConfigStore;

    fn service(dir: &std::path::Path) -> (AdminService, Arc<InMemoryConfigStore>) {
        let config = CacheConfig {
            directory: dir.join("pages"),
            ..Default::default()
        };
        let store = Arc::new(CacheStore::from_name(None, &config));
        let cache = Arc::new(PageCache::new(config, store));
        let config_store = Arc::new(InMemoryConfigStore::new());
        (AdminService::new(cache, config_store.clone()), config_store)
    }

    fn key() -> crate::cache::CacheKey {
        build_key(&KeyDimensions {
            device: Device::Desktop,
            language_id: 1,
            shop_id: 1,
            uri: "/",
        })
    }

    #[tokio::test]
    async fn status_lists_supported_backends_with_active_marker() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (admin, _) = service(dir.path());

        let status = admin.backend_status();
        assert_eq!(status.active, "files");
        let names: Vec<_> = status.supported.iter().map(|opt| opt.name).collect();
        assert_eq!(names, vec!["files", "memory"]);
        assert!(status.supported[0].active);
        assert!(!status.supported[1].active);
    }

    #[tokio::test]
    async fn set_backend_persists_switches_and_clears() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (admin, config_store) = service(dir.path());

        let status = admin.set_backend("memory").await.expect("supported backend");
        assert_eq!(status.active, "memory");
        assert_eq!(
            config_store.get(BACKEND_KEY).await.expect("read").as_deref(),
            Some("memory")
        );
        assert_eq!(admin.cache().store().kind(), BackendKind::Memory);

        let store = admin.cache().store();
        store
            .set(&key(), Bytes::from_static(b"page"), Duration::from_secs(60))
            .await;
        admin.set_backend("memory").await.expect("same backend");
        assert!(store.get(&key()).await.is_none());
    }

    #[tokio::test]
    async fn unsupported_backend_is_rejected_without_side_effects() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (admin, config_store) = service(dir.path());

        let err = admin.set_backend("redis").await.expect_err("unsupported");
        assert!(matches!(err, AdminError::UnsupportedBackend(_)));
        assert_eq!(config_store.get(BACKEND_KEY).await.expect("read"), None);
        assert_eq!(admin.cache().store().kind(), BackendKind::Files);
    }

    #[tokio::test]
    async fn clear_all_empties_the_active_backend() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (admin, _) = service(dir.path());
        let store = admin.cache().store();
        store
            .set(&key(), Bytes::from_static(b"page"), Duration::from_secs(60))
            .await;

        assert!(admin.clear_all().await);
        assert!(store.get(&key()).await.is_none());
    }

    #[tokio::test]
    async fn detached_service_reports_process_local_clears_as_not_done() {
        let dir = tempfile::tempdir().expect("temp dir");
        let (embedded, config_store) = service(dir.path());
        let admin = AdminService::detached(Arc::clone(embedded.cache()), config_store);

        assert!(admin.reaches_host());
        assert!(admin.clear_all().await);

        admin.set_backend("memory").await.expect("supported backend");
        let store = admin.cache().store();
        store
            .set(&key(), Bytes::from_static(b"page"), Duration::from_secs(60))
            .await;

        assert!(!admin.reaches_host());
        assert!(!admin.clear_all().await);
        assert!(
            !admin
                .dispatch_event(InvalidationEventKind::ProductUpdated)
                .await
        );
        assert!(store.get(&key()).await.is_some());

        assert!(embedded.reaches_host());
        assert!(embedded.dispatch_event(InvalidationEventKind::ProductUpdated).await);
        assert!(store.get(&key()).await.is_none());
    }

    #[tokio::test]
    async fn persisted_backend_falls_back_for_unknown_names() {
        let config_store = InMemoryConfigStore::new();
        assert_eq!(
            AdminService::persisted_backend(&config_store).await,
            BackendKind::Files
        );

        config_store
            .set(BACKEND_KEY, "memcached")
            .await
            .expect("set");
        assert_eq!(
            AdminService::persisted_backend(&config_store).await,
            BackendKind::Files
        );

        config_store.set(BACKEND_KEY, "memory").await.expect("set");
        assert_eq!(
            AdminService::persisted_backend(&config_store).await,
            BackendKind::Memory
        );
    }
}
