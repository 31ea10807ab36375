//! Content-mutation events that invalidate stored pages.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Mutation kinds the page cache subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidationEventKind {
    /// Host-wide cache clear requested by the dispatcher.
    DispatcherClear,
    /// Compiled templates/assets were flushed.
    CompiledAssetsClear,
    CategoryAdded,
    CategoryUpdated,
    CategoryDeleted,
    ProductAdded,
    ProductUpdated,
    ProductDeleted,
    ProductSaved,
}

impl InvalidationEventKind {
    pub const ALL: [InvalidationEventKind; 9] = [
        Self::DispatcherClear,
        Self::CompiledAssetsClear,
        Self::CategoryAdded,
        Self::CategoryUpdated,
        Self::CategoryDeleted,
        Self::ProductAdded,
        Self::ProductUpdated,
        Self::ProductDeleted,
        Self::ProductSaved,
    ];

    /// Name of the host hook this kind is registered against.
    pub fn hook_name(self) -> &'static str {
        match self {
            Self::DispatcherClear => "actionClearCache",
            Self::CompiledAssetsClear => "actionClearCompileCache",
            Self::CategoryAdded => "actionCategoryAdd",
            Self::CategoryUpdated => "actionCategoryUpdate",
            Self::CategoryDeleted => "actionCategoryDelete",
            Self::ProductAdded => "actionProductAdd",
            Self::ProductUpdated => "actionProductUpdate",
            Self::ProductDeleted => "actionProductDelete",
            Self::ProductSaved => "actionProductSave",
        }
    }

    /// Short label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DispatcherClear => "dispatcher_clear",
            Self::CompiledAssetsClear => "compiled_assets_clear",
            Self::CategoryAdded => "category_added",
            Self::CategoryUpdated => "category_updated",
            Self::CategoryDeleted => "category_deleted",
            Self::ProductAdded => "product_added",
            Self::ProductUpdated => "product_updated",
            Self::ProductDeleted => "product_deleted",
            Self::ProductSaved => "product_saved",
        }
    }
}

impl fmt::Display for InvalidationEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown invalidation event `{0}`")]
pub struct UnknownEvent(pub String);

/// Accepts either the hook name (`actionProductUpdate`, case-insensitive) or the
/// short label (`product_updated`).
impl FromStr for InvalidationEventKind {
    type Err = UnknownEvent;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.hook_name().eq_ignore_ascii_case(value) || kind.as_str() == value)
            .ok_or_else(|| UnknownEvent(value.to_string()))
    }
}

/// A received mutation event.
#[derive(Debug, Clone)]
pub struct InvalidationEvent {
    /// Correlates log lines for one event.
    pub id: Uuid,
    pub kind: InvalidationEventKind,
    pub received_at: OffsetDateTime,
}

impl InvalidationEvent {
    pub fn new(kind: InvalidationEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            received_at: OffsetDateTime::now_utc(),
        }
    }
}
