use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Failures that happen before any body byte is sent.
#[derive(Debug, Error)]
pub enum WebError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("Format unavailable")]
    FormatUnavailable,

    #[error("{0}")]
    Download(&'static str),
}

impl WebError {
    fn status_code(&self) -> StatusCode {
        match self {
            WebError::Validation(_) | WebError::FormatUnavailable => StatusCode::BAD_REQUEST,
            WebError::Download(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
