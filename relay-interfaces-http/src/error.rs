use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use relay_application::AppError;
use relay_domain::HistoryError;

#[derive(Debug)]
pub enum HttpError {
    NotFound,
    Forbidden,
    BadRequest(String),
    Internal(String),
}

impl From<AppError> for HttpError {
    fn from(value: AppError) -> Self {
        match value.root() {
            AppError::UnknownServer(_) => HttpError::NotFound,
            AppError::SignatureMismatch => HttpError::Forbidden,
            AppError::BadRequest(msg) => HttpError::BadRequest(msg.clone()),
            AppError::History(HistoryError::MissingSubjectId) => {
                HttpError::BadRequest(value.to_string())
            }
            other => HttpError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            HttpError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            HttpError::Forbidden => (StatusCode::FORBIDDEN, "signature mismatch".to_string()),
            HttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, format!("bad request: {}", msg)),
            HttpError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
