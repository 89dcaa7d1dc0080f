//! Error types for the Folio Preview server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::api::ApiError;
use crate::render::RenderError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Knowledge base error: {0}")]
    Api(#[from] ApiError),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Render(e) => match e {
                RenderError::Cancelled => (
                    StatusCode::CONFLICT,
                    "cancelled",
                    "Superseded by a newer request".to_string(),
                ),
                RenderError::NoDocument => {
                    (StatusCode::CONFLICT, "no_document", e.to_string())
                }
                RenderError::EmptyDocument | RenderError::Decode(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "invalid_document", e.to_string())
                }
                RenderError::Fetch(_) => {
                    tracing::warn!("Render fetch error: {}", e);
                    (StatusCode::BAD_GATEWAY, "fetch_error", e.to_string())
                }
                RenderError::Timeout(_) => {
                    tracing::warn!("Render timed out: {}", e);
                    (StatusCode::GATEWAY_TIMEOUT, "timeout", e.to_string())
                }
                _ => {
                    tracing::error!("Render error: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "render_error",
                        "Failed to render document".to_string(),
                    )
                }
            },
            AppError::Api(e) => {
                tracing::warn!("Knowledge base error: {}", e);
                match e {
                    ApiError::Status { status: 404, .. } => {
                        (StatusCode::NOT_FOUND, "not_found", "Not found upstream".to_string())
                    }
                    _ => (
                        StatusCode::BAD_GATEWAY,
                        "upstream_error",
                        "Knowledge base request failed".to_string(),
                    ),
                }
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
