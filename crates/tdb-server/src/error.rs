//! Server-specific error types
//!
//! Database failures never surface here: they travel inside the
//! `ResultEnvelope` with a 200 status. `AppError` only covers requests that
//! are rejected before any statement runs.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Message returned when `/execute` or `/query` gets no SQL
pub const NO_BODY: &str = "No Body";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn no_body() -> Self {
        AppError::BadRequest(NO_BODY.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            },
        };

        // The body is the bare JSON string
        (status, Json(message)).into_response()
    }
}
