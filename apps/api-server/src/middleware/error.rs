//! Error handling middleware - RFC 7807 compliant responses.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use ratekeeper_core::EventLogError;
use ratekeeper_shared::ErrorResponse;
use thiserror::Error;

/// Application-level error type that converts to RFC 7807 responses.
///
/// Rate limit denials are not errors; they are rendered by the adapters.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let error = match self {
            AppError::BadRequest(detail) => ErrorResponse::bad_request(detail),
            AppError::Unavailable(detail) => ErrorResponse::service_unavailable(detail),
            AppError::Internal(detail) => {
                // Log internal errors
                tracing::error!(detail = %detail, "Internal error");
                ErrorResponse::internal_error()
            }
        };

        HttpResponse::build(self.status_code()).json(error)
    }
}

impl From<EventLogError> for AppError {
    fn from(err: EventLogError) -> Self {
        match err {
            EventLogError::Backend(msg) => {
                tracing::error!(error = %msg, "Event log backend error");
                AppError::Unavailable("Rate limit event log is unavailable".to_string())
            }
            EventLogError::Serialization(msg) => AppError::Internal(msg),
        }
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn test_backend_errors_become_503_problem_details() {
        let err = AppError::from(EventLogError::Backend("connection reset".into()));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let body = to_bytes(err.error_response().into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], 503);
        assert_eq!(body["title"], "Service Unavailable");
        assert!(!body["detail"].as_str().unwrap().contains("connection reset"));
    }
}
