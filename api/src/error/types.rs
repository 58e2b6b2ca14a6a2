use thiserror::Error;
use axum::response::{IntoResponse, Response};
use axum::http::StatusCode;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("No page route for {0}")]
    RouteMismatch(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Don't expose paths or OS error text
        let (status, body) = match &self {
            AppError::RouteMismatch(_) => (StatusCode::NOT_FOUND, "404 page not found"),
            AppError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to access page storage",
            ),
        };

        (status, body).into_response()
    }
}
