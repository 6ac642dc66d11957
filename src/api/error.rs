use axum::{
    http::StatusCode,
    BoxError,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tower::timeout::error::Elapsed;
use tracing::error;

/// JSON error body. The HTTP status always equals `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub message: String,
    pub code: u16,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: status.as_u16(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Fallback for unmatched routes
pub async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Not found.")
}

/// Maps errors from the write deadline layer
pub async fn timed_out(err: BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        ApiError::new(StatusCode::REQUEST_TIMEOUT, "Request timed out.")
    } else {
        error!(error = %err, "Unhandled middleware error");
        ApiError::internal("Internal server error. Please try again later.")
    }
}
