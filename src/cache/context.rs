//! Per-request context consumed by the page cache.
//!
//! The host pipeline attaches a [`StorefrontContext`] to the request extensions; the
//! HTTP method, raw URI and ajax flag come from the request itself. Every field the
//! host supplies is optional: a missing value makes the request ineligible rather
//! than failing it.

use std::fmt;
use std::str::FromStr;

use axum::http::{HeaderMap, Method, request::Parts};

const AJAX_PARAM: &str = "ajax";
const REQUESTED_WITH_HEADER: &str = "x-requested-with";
const XML_HTTP_REQUEST: &str = "xmlhttprequest";

/// Device class the storefront renders for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Desktop,
    Tablet,
    Mobile,
}

impl Device {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Tablet => "tablet",
            Self::Mobile => "mobile",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownDevice(pub String);

impl fmt::Display for UnknownDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown device `{}`", self.0)
    }
}

impl std::error::Error for UnknownDevice {}

impl FromStr for Device {
    type Err = UnknownDevice;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "desktop" | "computer" => Ok(Self::Desktop),
            "tablet" => Ok(Self::Tablet),
            "mobile" | "phone" => Ok(Self::Mobile),
            _ => Err(UnknownDevice(value.to_string())),
        }
    }
}

/// Kind of controller handling the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerCategory {
    /// Customer-facing storefront page.
    Front,
    /// Back-office page.
    Admin,
    /// Module-provided front controller.
    Module,
    /// Webservice / API endpoint.
    Api,
}

/// Controller resolved by the host dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerInfo {
    pub category: ControllerCategory,
    pub name: String,
}

impl ControllerInfo {
    pub fn front(name: impl Into<String>) -> Self {
        Self {
            category: ControllerCategory::Front,
            name: name.into(),
        }
    }

    pub fn new(category: ControllerCategory, name: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
        }
    }
}

/// Storefront state the host attaches to each request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorefrontContext {
    pub device: Option<Device>,
    pub language_id: Option<u32>,
    pub shop_id: Option<u32>,
    pub controller: Option<ControllerInfo>,
    /// Authenticated customer; `None` or `Some(0)` is a guest.
    pub customer_id: Option<u64>,
    pub cart_item_count: Option<u32>,
    /// Host-side profiling toggle, merged with the configured debug mode.
    pub profiling: bool,
}

/// Everything the eligibility rules and the key builder look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub device: Option<Device>,
    pub language_id: Option<u32>,
    pub shop_id: Option<u32>,
    /// Raw request URI: path plus query, exactly as received.
    pub uri: Option<String>,
    pub controller: Option<ControllerInfo>,
    pub method: Method,
    pub ajax: bool,
    pub customer_id: Option<u64>,
    pub cart_item_count: Option<u32>,
    pub debug: bool,
}

/// The tuple a cache key is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyDimensions<'a> {
    pub device: Device,
    pub language_id: u32,
    pub shop_id: u32,
    pub uri: &'a str,
}

impl RequestContext {
    /// Assemble the context from request parts, the host's storefront state and the
    /// configured debug mode.
    pub fn from_parts(parts: &Parts, debug_mode: bool) -> Self {
        let storefront = parts.extensions.get::<StorefrontContext>();
        let uri = parts
            .uri
            .path_and_query()
            .map(|value| value.as_str().to_string());
        let ajax = is_ajax(parts.uri.query(), &parts.headers);

        Self::from_storefront(storefront, parts.method.clone(), uri, ajax, debug_mode)
    }

    pub fn from_storefront(
        storefront: Option<&StorefrontContext>,
        method: Method,
        uri: Option<String>,
        ajax: bool,
        debug_mode: bool,
    ) -> Self {
        match storefront {
            Some(storefront) => Self {
                device: storefront.device,
                language_id: storefront.language_id,
                shop_id: storefront.shop_id,
                uri,
                controller: storefront.controller.clone(),
                method,
                ajax,
                customer_id: storefront.customer_id,
                cart_item_count: storefront.cart_item_count,
                debug: debug_mode || storefront.profiling,
            },
            None => Self {
                device: None,
                language_id: None,
                shop_id: None,
                uri,
                controller: None,
                method,
                ajax,
                customer_id: None,
                cart_item_count: None,
                debug: debug_mode,
            },
        }
    }

    /// Replace the host-supplied fields with state observed after rendering.
    pub fn with_storefront(&self, storefront: &StorefrontContext) -> Self {
        Self::from_storefront(
            Some(storefront),
            self.method.clone(),
            self.uri.clone(),
            self.ajax,
            self.debug,
        )
    }

    /// Key dimensions, or `None` when any of them is missing or empty.
    pub fn dimensions(&self) -> Option<KeyDimensions<'_>> {
        let uri = self.uri.as_deref().filter(|uri| !uri.is_empty())?;
        Some(KeyDimensions {
            device: self.device?,
            language_id: self.language_id?,
            shop_id: self.shop_id?,
            uri,
        })
    }
}

fn is_ajax(query: Option<&str>, headers: &HeaderMap) -> bool {
    let from_query = query.is_some_and(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .any(|(name, value)| name == AJAX_PARAM && is_truthy(&value))
    });

    from_query
        || headers
            .get(REQUESTED_WITH_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case(XML_HTTP_REQUEST))
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim(), "" | "0" | "false")
}
