//! Cache key derivation.
//!
//! A key is the SHA-256 of `device-{device}-lang-{lang}-shop-{shop}-{uri}`, hex encoded.
//! No salt is mixed in, so every instance computes the same key for the same request.

use std::fmt;

use sha2::{Digest, Sha256};

use super::context::{KeyDimensions, RequestContext};

/// Opaque, fixed-length page cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The plain-text form hashed into a key.
pub fn key_source(dims: &KeyDimensions<'_>) -> String {
    format!(
        "device-{}-lang-{}-shop-{}-{}",
        dims.device, dims.language_id, dims.shop_id, dims.uri
    )
}

pub fn build_key(dims: &KeyDimensions<'_>) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(key_source(dims).as_bytes());
    CacheKey(hex::encode(hasher.finalize()))
}

/// Key for a full request context, `None` when a dimension is missing.
pub fn key_for(ctx: &RequestContext) -> Option<CacheKey> {
    ctx.dimensions().map(|dims| build_key(&dims))
}
