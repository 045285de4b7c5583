//! JSON error responses for the HTTP API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sb_core::SbError;
use serde_json::json;

/// API error with status code and message, built from [`SbError`].
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<SbError> for ApiError {
    fn from(err: SbError) -> Self {
        let status = match &err {
            SbError::SessionNotFound { .. } => StatusCode::NOT_FOUND,
            SbError::EmptyQuery | SbError::NoAgent => StatusCode::BAD_REQUEST,
            SbError::Busy { .. } => StatusCode::CONFLICT,
            SbError::Agent { .. } | SbError::SessionConstruction { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self { status, code: err.code(), message: err.to_string() }
    }
}
