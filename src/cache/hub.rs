//! Event-driven invalidation.
//!
//! Every subscribed event clears the whole store. Stored pages do not record which
//! entities they were rendered from, so there is nothing finer to invalidate.

use std::sync::Arc;
use std::time::Instant;

use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::events::{InvalidationEvent, InvalidationEventKind, UnknownEvent};
use super::store::CacheStore;

const METRIC_CLEAR: &str = "fpcache_clear_total";

pub struct InvalidationHub {
    store: Arc<CacheStore>,
}

impl InvalidationHub {
    pub fn new(store: Arc<CacheStore>) -> Self {
        Self { store }
    }

    /// Event kinds to register with the host's event source.
    pub fn subscriptions(&self) -> &'static [InvalidationEventKind] {
        &InvalidationEventKind::ALL
    }

    /// Handle one event; returns whether the backend confirmed the clear.
    #[instrument(skip(self), fields(event_kind = %kind))]
    pub async fn on_event(&self, kind: InvalidationEventKind) -> bool {
        let event = InvalidationEvent::new(kind);
        let reason = match event.kind {
            InvalidationEventKind::DispatcherClear => "dispatcher_clear",
            InvalidationEventKind::CompiledAssetsClear => "compiled_assets_clear",
            InvalidationEventKind::CategoryAdded
            | InvalidationEventKind::CategoryUpdated
            | InvalidationEventKind::CategoryDeleted => "category_change",
            InvalidationEventKind::ProductAdded
            | InvalidationEventKind::ProductUpdated
            | InvalidationEventKind::ProductDeleted
            | InvalidationEventKind::ProductSaved => "product_change",
        };

        let started_at = Instant::now();
        let cleared = self.store.clear().await;

        info!(
            event_id = %event.id,
            event_kind = %event.kind,
            reason,
            cleared,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Page cache cleared by content event"
        );
        counter!(METRIC_CLEAR, "reason" => reason).increment(1);

        cleared
    }

    /// Handle an event addressed by its host hook name.
    pub async fn on_hook(&self, hook: &str) -> Result<bool, UnknownEvent> {
        let kind = hook.parse::<InvalidationEventKind>()?;
        Ok(self.on_event(kind).await)
    }

    /// Drain events from an in-process channel until every sender is dropped.
    pub fn spawn_listener(
        self: Arc<Self>,
        mut events: mpsc::Receiver<InvalidationEventKind>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(kind) = events.recv().await {
                self.on_event(kind).await;
            }
            debug!("Invalidation event channel closed");
        })
    }
}

/// Manual clear from the admin surface.
pub(crate) async fn clear_manually(store: &CacheStore) -> bool {
    let cleared = store.clear().await;
    if cleared {
        info!("Page cache cleared manually");
    } else {
        warn!("Manual page cache clear failed");
    }
    counter!(METRIC_CLEAR, "reason" => "manual").increment(1);
    cleared
}
