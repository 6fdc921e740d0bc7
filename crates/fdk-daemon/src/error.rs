//! HTTP error mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use fdk_dispatch::DispatchError;

/// Wire form of every error response: `{"error": ..., "kind": ...}`.
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            kind: "forbidden",
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            kind: "invalid_input",
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "not_found",
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(kind = self.kind, message = %self.message, "request failed");
        }
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
                kind: self.kind,
            }),
        )
            .into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(e: DispatchError) -> Self {
        let status = match &e {
            DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::Forbidden(_) => StatusCode::FORBIDDEN,
            DispatchError::StateConflict(_) | DispatchError::Conflict(_) => StatusCode::CONFLICT,
            DispatchError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DispatchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<fdk_db::StoreError> for ApiError {
    fn from(e: fdk_db::StoreError) -> Self {
        DispatchError::from(e).into()
    }
}
