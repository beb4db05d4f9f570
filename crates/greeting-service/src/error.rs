use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use greeting_core::GreetingError;
use serde::Serialize;
use thiserror::Error;

use crate::queue::QueueError;

/// Startup failures.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("core engine error: {0}")]
    Core(#[from] GreetingError),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Core(#[from] GreetingError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl ApiError {
    pub(crate) fn not_found(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub(crate) fn unauthorized(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self::Http {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Http { status, .. } if *status == StatusCode::NOT_FOUND => {
                (*status, "NOT_FOUND")
            }
            ApiError::Http { status, .. } if *status == StatusCode::UNAUTHORIZED => {
                (*status, "UNAUTHORIZED")
            }
            ApiError::Http { status, .. } => (*status, "BAD_REQUEST"),
            ApiError::Core(err) => match err {
                GreetingError::Validation(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR")
                }
                GreetingError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                GreetingError::VerificationMismatch(_) => {
                    (StatusCode::CONFLICT, "VERIFICATION_MISMATCH")
                }
                GreetingError::AlreadyResolved { .. } => (StatusCode::CONFLICT, "ALREADY_RESOLVED"),
                GreetingError::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "TRANSIENT"),
                GreetingError::Integrity(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTEGRITY_ERROR")
                }
            },
            ApiError::Queue(_) => (StatusCode::INTERNAL_SERVER_ERROR, "QUEUE_ERROR"),
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let details = match &self {
            ApiError::Core(GreetingError::Validation(errors)) => serde_json::to_value(errors).ok(),
            ApiError::Core(GreetingError::AlreadyResolved { accepted_at }) => {
                Some(serde_json::json!({ "accepted_at": accepted_at }))
            }
            _ => None,
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greeting_core::DraftField;

    #[test]
    fn core_errors_map_to_statuses() {
        let cases = [
            (
                GreetingError::invalid(DraftField::Message, "required"),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                GreetingError::greeting_not_found("abc"),
                StatusCode::NOT_FOUND,
            ),
            (
                GreetingError::VerificationMismatch("used".to_string()),
                StatusCode::CONFLICT,
            ),
            (
                GreetingError::Transient("db down".to_string()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                GreetingError::Integrity("entry 3 hash mismatch".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
        assert_eq!(
            ApiError::bad_request("bad").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::unauthorized("no credential").status_and_code(),
            (StatusCode::UNAUTHORIZED, "UNAUTHORIZED")
        );
    }
}
