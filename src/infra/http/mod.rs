//! Administrative HTTP surface.

pub mod error;
pub mod handlers;
mod middleware;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::admin::AdminService;

pub use middleware::{RequestId, log_responses, set_request_context};

#[derive(Clone)]
pub struct AdminState {
    pub admin: AdminService,
}

pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/cache/backend",
            get(handlers::get_backend).put(handlers::put_backend),
        )
        .route("/cache/clear", post(handlers::clear_cache))
        .route("/events/{hook}", post(handlers::dispatch_event))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
