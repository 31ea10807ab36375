//! The two pipeline stages of the page cache.
//!
//! [`PageCache`] is built once at startup and shared behind an `Arc`. Hosts call
//! [`PageCache::pre_dispatch`] before routing and [`PageCache::post_render`] once the
//! final HTML exists. Both stages consult the same [`EligibilityClassifier`].

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use tracing::{debug, instrument};

use super::capture::{CaptureOutcome, ResponseCapture, SkipReason};
use super::config::CacheConfig;
use super::context::RequestContext;
use super::eligibility::{Eligibility, EligibilityClassifier};
use super::hub::InvalidationHub;
use super::keys::{CacheKey, key_for};
use super::minify::{HtmlMinifier, LolHtmlMinifier};
use super::store::CacheStore;

const METRIC_HIT: &str = "fpcache_hit_total";
const METRIC_MISS: &str = "fpcache_miss_total";

/// Headers sent with every cached page so browsers and proxies always come back to
/// the origin.
pub const NO_CACHE_HEADERS: [(&str, &str); 3] = [
    ("cache-control", "no-cache, no-store, must-revalidate"),
    ("pragma", "no-cache"),
    ("expires", "0"),
];

/// A stored page ready to be sent as the complete response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage {
    pub key: CacheKey,
    pub body: Bytes,
}

/// Result of the pre-dispatch stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreDispatch {
    /// Terminate the pipeline with this page.
    Serve(CachedPage),
    /// Render normally.
    Continue,
}

pub struct PageCache {
    config: CacheConfig,
    classifier: EligibilityClassifier,
    store: Arc<CacheStore>,
    capture: ResponseCapture,
    hub: Arc<InvalidationHub>,
}

impl PageCache {
    pub fn new(config: CacheConfig, store: Arc<CacheStore>) -> Self {
        Self::with_minifier(config, store, Arc::new(LolHtmlMinifier))
    }

    pub fn with_minifier(
        config: CacheConfig,
        store: Arc<CacheStore>,
        minifier: Arc<dyn HtmlMinifier>,
    ) -> Self {
        let classifier = EligibilityClassifier::new(config.exempt_controllers.iter().cloned());
        let capture = ResponseCapture::new(store.clone(), minifier, config.ttl());
        let hub = Arc::new(InvalidationHub::new(store.clone()));
        Self {
            config,
            classifier,
            store,
            capture,
            hub,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn classifier(&self) -> &EligibilityClassifier {
        &self.classifier
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn hub(&self) -> &Arc<InvalidationHub> {
        &self.hub
    }

    #[instrument(skip_all, fields(uri = ctx.uri.as_deref().unwrap_or("")))]
    pub async fn pre_dispatch(&self, ctx: &RequestContext) -> PreDispatch {
        let Some(key) = self.eligible_key(ctx, "serve") else {
            return PreDispatch::Continue;
        };

        match self.store.get(&key).await {
            Some(body) => {
                debug!(cache = "page", outcome = "hit", key = %key, "Serving cached page");
                counter!(METRIC_HIT).increment(1);
                PreDispatch::Serve(CachedPage { key, body })
            }
            None => {
                debug!(cache = "page", outcome = "miss", key = %key, "Page cache miss");
                counter!(METRIC_MISS).increment(1);
                PreDispatch::Continue
            }
        }
    }

    /// Runs after every render; does nothing for ineligible requests.
    #[instrument(skip_all, fields(uri = ctx.uri.as_deref().unwrap_or(""), bytes = body.len()))]
    pub async fn post_render(&self, ctx: &RequestContext, body: &[u8]) -> CaptureOutcome {
        match self.eligible_key(ctx, "capture") {
            Some(key) => self.capture.capture(key, body).await,
            None => CaptureOutcome::Skipped(SkipReason::Ineligible),
        }
    }

    fn eligible_key(&self, ctx: &RequestContext, stage: &'static str) -> Option<CacheKey> {
        match self.classifier.classify(ctx) {
            Eligibility::Eligible => key_for(ctx),
            Eligibility::Rejected(reason) => {
                debug!(cache = "page", stage, reason = %reason, "Request bypasses page cache");
                None
            }
        }
    }
}
