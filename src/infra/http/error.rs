use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::admin::AdminError;
use crate::application::error::ErrorReport;
use crate::cache::UnknownEvent;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const UNSUPPORTED_BACKEND: &str = "unsupported_backend";
    pub const UNKNOWN_EVENT: &str = "unknown_event";
    pub const SETTINGS: &str = "settings_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
        }
    }
}

impl From<AdminError> for ApiError {
    fn from(err: AdminError) -> Self {
        match err {
            AdminError::UnsupportedBackend(err) => ApiError::new(
                StatusCode::UNPROCESSABLE_ENTITY,
                codes::UNSUPPORTED_BACKEND,
                "Backend is not supported",
                Some(err.to_string()),
            ),
            AdminError::ConfigStore(err) => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::SETTINGS,
                "Settings could not be saved",
                Some(err.to_string()),
            ),
        }
    }
}

impl From<UnknownEvent> for ApiError {
    fn from(err: UnknownEvent) -> Self {
        ApiError::new(
            StatusCode::NOT_FOUND,
            codes::UNKNOWN_EVENT,
            "Event is not subscribed",
            Some(err.to_string()),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let hint = self.hint.clone();
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            "infra::http",
            self.status,
            format!("{}: {}", self.code, hint.as_deref().unwrap_or(self.message)),
        )
        .attach(&mut response);
        response
    }
}
