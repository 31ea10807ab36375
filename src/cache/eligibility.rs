//! The single rule set deciding whether a request takes part in page caching.
//!
//! The same [`EligibilityClassifier`] gates the serve checkpoint and the capture
//! checkpoint. Rules are evaluated in order and the first failing one is reported.

use std::collections::HashSet;
use std::fmt;

use axum::http::Method;

use super::context::{ControllerCategory, RequestContext};

/// Controllers of the purchase flow, never cached.
pub const DEFAULT_EXEMPT_CONTROLLERS: &[&str] = &["OrderController", "OrderOpcController"];

/// Why a request was kept away from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    DebugMode,
    Ajax,
    NonGetMethod,
    /// No controller attached, or not a front controller.
    NotFrontController,
    ExemptController,
    AuthenticatedCustomer,
    /// Cart count missing or non-zero.
    CartNotEmpty,
    /// Device, language, shop or URI missing.
    IncompleteContext,
}

impl Rejection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DebugMode => "debug_mode",
            Self::Ajax => "ajax",
            Self::NonGetMethod => "non_get_method",
            Self::NotFrontController => "not_front_controller",
            Self::ExemptController => "exempt_controller",
            Self::AuthenticatedCustomer => "authenticated_customer",
            Self::CartNotEmpty => "cart_not_empty",
            Self::IncompleteContext => "incomplete_context",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Rejected(Rejection),
}

impl Eligibility {
    pub fn is_eligible(self) -> bool {
        matches!(self, Self::Eligible)
    }
}

#[derive(Debug, Clone)]
pub struct EligibilityClassifier {
    exempt_controllers: HashSet<String>,
}

impl Default for EligibilityClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_EXEMPT_CONTROLLERS.iter().copied())
    }
}

impl EligibilityClassifier {
    pub fn new<I, S>(exempt_controllers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exempt_controllers: exempt_controllers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_eligible(&self, ctx: &RequestContext) -> bool {
        self.classify(ctx).is_eligible()
    }

    pub fn classify(&self, ctx: &RequestContext) -> Eligibility {
        match self.first_rejection(ctx) {
            Some(rejection) => Eligibility::Rejected(rejection),
            None => Eligibility::Eligible,
        }
    }

    fn first_rejection(&self, ctx: &RequestContext) -> Option<Rejection> {
        if ctx.debug {
            return Some(Rejection::DebugMode);
        }
        if ctx.ajax {
            return Some(Rejection::Ajax);
        }
        if ctx.method != Method::GET {
            return Some(Rejection::NonGetMethod);
        }

        let Some(controller) = ctx.controller.as_ref() else {
            return Some(Rejection::NotFrontController);
        };
        if controller.category != ControllerCategory::Front {
            return Some(Rejection::NotFrontController);
        }
        if controller.name.is_empty() || self.exempt_controllers.contains(&controller.name) {
            return Some(Rejection::ExemptController);
        }

        if ctx.customer_id.is_some_and(|id| id > 0) {
            return Some(Rejection::AuthenticatedCustomer);
        }
        if ctx.cart_item_count != Some(0) {
            return Some(Rejection::CartNotEmpty);
        }
        if ctx.dimensions().is_none() {
            return Some(Rejection::IncompleteContext);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::context::{ControllerInfo, Device};

    fn guest_category_page() -> RequestContext {
        RequestContext {
            device: Some(Device::Desktop),
            language_id: Some(1),
            shop_id: Some(1),
            uri: Some("/category/5".to_string()),
            controller: Some(ControllerInfo::front("CategoryController")),
            method: Method::GET,
            ajax: false,
            customer_id: Some(0),
            cart_item_count: Some(0),
            debug: false,
        }
    }

    fn rejection(ctx: &RequestContext) -> Option<Rejection> {
        match EligibilityClassifier::default().classify(ctx) {
            Eligibility::Eligible => None,
            Eligibility::Rejected(reason) => Some(reason),
        }
    }

    #[test]
    fn guest_front_page_is_eligible() {
        assert!(EligibilityClassifier::default().is_eligible(&guest_category_page()));
    }

    #[test]
    fn absent_customer_counts_as_guest() {
        let ctx = RequestContext {
            customer_id: None,
            ..guest_category_page()
        };
        assert_eq!(rejection(&ctx), None);
    }

    #[test]
    fn logged_in_customer_is_rejected() {
        let ctx = RequestContext {
            customer_id: Some(7),
            ..guest_category_page()
        };
        assert_eq!(rejection(&ctx), Some(Rejection::AuthenticatedCustomer));
    }

    #[test]
    fn non_get_methods_are_rejected() {
        for method in [Method::POST, Method::HEAD, Method::PUT, Method::DELETE] {
            let ctx = RequestContext {
                method,
                ..guest_category_page()
            };
            assert_eq!(rejection(&ctx), Some(Rejection::NonGetMethod));
        }
    }

    #[test]
    fn ajax_and_debug_are_rejected() {
        let ajax = RequestContext {
            ajax: true,
            ..guest_category_page()
        };
        assert_eq!(rejection(&ajax), Some(Rejection::Ajax));

        let debug = RequestContext {
            debug: true,
            ..guest_category_page()
        };
        assert_eq!(rejection(&debug), Some(Rejection::DebugMode));
    }

    #[test]
    fn cart_with_items_is_rejected() {
        let ctx = RequestContext {
            cart_item_count: Some(3),
            ..guest_category_page()
        };
        assert_eq!(rejection(&ctx), Some(Rejection::CartNotEmpty));
    }

    #[test]
    fn checkout_controllers_are_rejected() {
        for name in DEFAULT_EXEMPT_CONTROLLERS {
            let ctx = RequestContext {
                controller: Some(ControllerInfo::front(*name)),
                ..guest_category_page()
            };
            assert_eq!(rejection(&ctx), Some(Rejection::ExemptController));
        }
    }

    #[test]
    fn configured_exemptions_replace_defaults() {
        let classifier = EligibilityClassifier::new(["CartController"]);
        let cart = RequestContext {
            controller: Some(ControllerInfo::front("CartController")),
            ..guest_category_page()
        };
        let order = RequestContext {
            controller: Some(ControllerInfo::front("OrderController")),
            ..guest_category_page()
        };
        assert!(!classifier.is_eligible(&cart));
        assert!(classifier.is_eligible(&order));
    }

    #[test]
    fn non_front_controllers_are_rejected() {
        for category in [
            ControllerCategory::Admin,
            ControllerCategory::Module,
            ControllerCategory::Api,
        ] {
            let ctx = RequestContext {
                controller: Some(ControllerInfo::new(category, "CategoryController")),
                ..guest_category_page()
            };
            assert_eq!(rejection(&ctx), Some(Rejection::NotFrontController));
        }
    }

    #[test]
    fn missing_fields_fail_closed() {
        let no_controller = RequestContext {
            controller: None,
            ..guest_category_page()
        };
        assert_eq!(rejection(&no_controller), Some(Rejection::NotFrontController));

        let no_cart = RequestContext {
            cart_item_count: None,
            ..guest_category_page()
        };
        assert_eq!(rejection(&no_cart), Some(Rejection::CartNotEmpty));

        let no_shop = RequestContext {
            shop_id: None,
            ..guest_category_page()
        };
        assert_eq!(rejection(&no_shop), Some(Rejection::IncompleteContext));

        let empty_uri = RequestContext {
            uri: Some(String::new()),
            ..guest_category_page()
        };
        assert_eq!(rejection(&empty_uri), Some(Rejection::IncompleteContext));
    }
}
