use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use super::AdminState;
use super::error::ApiError;
use crate::application::admin::BackendStatus;
use crate::cache::InvalidationEventKind;

#[derive(Debug, Deserialize)]
pub struct SetBackendRequest {
    pub backend: String,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub cleared: bool,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub event: &'static str,
    pub hook: &'static str,
    pub cleared: bool,
}

pub async fn health() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

pub async fn get_backend(State(state): State<AdminState>) -> Json<BackendStatus> {
    Json(state.admin.backend_status())
}

pub async fn put_backend(
    State(state): State<AdminState>,
    Json(request): Json<SetBackendRequest>,
) -> Result<Json<BackendStatus>, ApiError> {
    let status = state.admin.set_backend(&request.backend).await?;
    Ok(Json(status))
}

pub async fn clear_cache(State(state): State<AdminState>) -> Json<ClearResponse> {
    let cleared = state.admin.clear_all().await;
    Json(ClearResponse { cleared })
}

pub async fn dispatch_event(
    State(state): State<AdminState>,
    Path(hook): Path<String>,
) -> Result<Json<EventResponse>, ApiError> {
    let kind: InvalidationEventKind = hook.parse()?;
    let cleared = state.admin.dispatch_event(kind).await;
    Ok(Json(EventResponse {
        event: kind.as_str(),
        hook: kind.hook_name(),
        cleared,
    }))
}
