//! Post-render capture: minify, annotate and store an eligible page.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use metrics::{counter, histogram};
use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};
use tracing::{debug, warn};

use super::keys::CacheKey;
use super::minify::HtmlMinifier;
use super::store::CacheStore;

const MARKER_TIMESTAMP: &[FormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]");
const METRIC_STORE: &str = "fpcache_store_total";
const METRIC_MINIFY_FAILED: &str = "fpcache_minify_failed_total";
const METRIC_CAPTURE_BYTES: &str = "fpcache_capture_bytes";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Stored { key: CacheKey, bytes: usize },
    /// The backend refused the write; the response is unaffected.
    Dropped { key: CacheKey },
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Ineligible,
    EmptyBody,
}

pub struct ResponseCapture {
    store: Arc<CacheStore>,
    minifier: Arc<dyn HtmlMinifier>,
    ttl: Duration,
}

impl ResponseCapture {
    pub fn new(store: Arc<CacheStore>, minifier: Arc<dyn HtmlMinifier>, ttl: Duration) -> Self {
        Self {
            store,
            minifier,
            ttl,
        }
    }

    /// Store `body` under `key`. Callers have already established eligibility.
    pub async fn capture(&self, key: CacheKey, body: &[u8]) -> CaptureOutcome {
        if body.is_empty() {
            return CaptureOutcome::Skipped(SkipReason::EmptyBody);
        }

        let minified = match self.minifier.minify(body) {
            Ok(minified) => minified,
            Err(err) => {
                warn!(
                    key = %key,
                    error = %err,
                    "Minification failed, storing page unminified"
                );
                counter!(METRIC_MINIFY_FAILED).increment(1);
                Bytes::copy_from_slice(body)
            }
        };

        let content = annotate(&minified, &key, OffsetDateTime::now_utc());
        let bytes = content.len();

        if self.store.set(&key, content, self.ttl).await {
            debug!(cache = "page", key = %key, bytes, "Page captured");
            counter!(METRIC_STORE).increment(1);
            histogram!(METRIC_CAPTURE_BYTES).record(bytes as f64);
            CaptureOutcome::Stored { key, bytes }
        } else {
            CaptureOutcome::Dropped { key }
        }
    }
}

/// Append the trailing `<!--{key} {YYYYmmddHHMMSS}-->` marker.
pub fn annotate(body: &[u8], key: &CacheKey, at: OffsetDateTime) -> Bytes {
    let stamp = at
        .to_offset(time::UtcOffset::UTC)
        .format(MARKER_TIMESTAMP)
        .unwrap_or_default();
    let marker = format!("<!--{key} {stamp}-->");

    let mut content = BytesMut::with_capacity(body.len() + marker.len());
    content.extend_from_slice(body);
    content.extend_from_slice(marker.as_bytes());
    content.freeze()
}
