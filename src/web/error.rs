use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::schedule::TaskError;
use crate::utils::http::ErrorResponse;

impl TaskError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TaskError::Validation(_) => StatusCode::BAD_REQUEST,
            TaskError::NoActiveTask => StatusCode::NOT_FOUND,
            TaskError::Busy => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for TaskError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}
