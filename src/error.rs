//! Unified API error type.
//!
//! Handlers return `Result<T, ApiError>`; the [`IntoResponse`] impl renders a
//! `{"error": ...}` JSON body. Store and internal failures are logged in full
//! but only a generic message reaches the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::db::StoreError;
use crate::llm::LlmError;
use crate::miti::MitiError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("upstream error: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("upstream error: {0}")]
    UpstreamPayload(String),

    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ApiError::Upstream(e) => {
                error!(error = %e, "upstream request failed");
                (StatusCode::BAD_GATEWAY, "upstream service unavailable".to_owned())
            }
            ApiError::UpstreamPayload(m) => {
                error!(message = %m, "upstream returned an unexpected payload");
                (StatusCode::BAD_GATEWAY, m.clone())
            }
            ApiError::Llm(e) => {
                error!(error = %e, "llm request failed");
                (StatusCode::BAD_GATEWAY, "inference backend error".to_owned())
            }
            ApiError::Store(e) => {
                error!(error = %e, "store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
            ApiError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<MitiError> for ApiError {
    fn from(e: MitiError) -> Self {
        match e {
            MitiError::MonthNotFound { .. } | MitiError::DayNotFound { .. } => {
                ApiError::NotFound(e.to_string())
            }
            MitiError::InvalidDate(_) => ApiError::BadRequest(e.to_string()),
            MitiError::Io(_) | MitiError::Json(_) => ApiError::Internal(e.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
