//! Full-page cache for storefront front-end requests.
//!
//! Eligible anonymous GET requests are answered from a pluggable store before the
//! host renders anything. Misses are rendered normally, then minified, annotated and
//! stored under a key derived from device, language, shop and URI. Any catalog or
//! dispatcher event clears the whole store.
//!
//! ## Configuration
//!
//! Cache behaviour is controlled via the `[cache]` section of `fpcache.toml`:
//!
//! ```toml
//! [cache]
//! directory = "var/fpcache"
//! ttl_seconds = 999999
//! memory_capacity = 10000
//! debug_mode = false
//! exempt_controllers = ["OrderController", "OrderOpcController"]
//! ```

mod capture;
mod config;
mod context;
mod eligibility;
mod events;
mod hub;
mod keys;
mod lock;
mod middleware;
mod minify;
mod orchestrator;
mod store;

pub use capture::{CaptureOutcome, ResponseCapture, SkipReason, annotate};
pub use config::{CacheConfig, DEFAULT_DIRECTORY, DEFAULT_MEMORY_CAPACITY, DEFAULT_TTL_SECONDS};
pub use context::{
    ControllerCategory, ControllerInfo, Device, KeyDimensions, RequestContext,
    StorefrontContext, UnknownDevice,
};
pub use eligibility::{DEFAULT_EXEMPT_CONTROLLERS, Eligibility, EligibilityClassifier, Rejection};
pub use events::{InvalidationEvent, InvalidationEventKind, UnknownEvent};
pub use hub::InvalidationHub;
pub(crate) use hub::clear_manually;
pub use keys::{CacheKey, build_key, key_for, key_source};
pub(crate) use lock::{rw_read, rw_write};
pub use middleware::{MAX_CAPTURE_BYTES, page_cache_layer};
pub use minify::{HtmlMinifier, LolHtmlMinifier, MinifyError};
pub use orchestrator::{CachedPage, NO_CACHE_HEADERS, PageCache, PreDispatch};
pub use store::{
    BackendKind, CacheBackend, CacheStore, FileBackend, MemoryBackend, StoreError,
    UnsupportedBackend, open_backend,
};
