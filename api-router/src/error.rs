use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::error::AppError;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Serialize, Clone)]
pub enum ApiError {
    #[error("Internal server error")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => Self::NotFound(msg),
            AppError::Validation(msg) => Self::ValidationError(msg),
            AppError::DuplicateName(msg) | AppError::ActiveGraphDeletion(msg) => {
                Self::Conflict(msg)
            }
            AppError::InstanceInit(msg) => {
                tracing::warn!("Engine unavailable: {msg}");
                Self::ServiceUnavailable("Graph engine could not be loaded".to_string())
            }
            _ => {
                tracing::error!("Internal error: {:?}", err);
                Self::InternalError("Internal server error".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::InternalError(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
            Self::ValidationError(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message),
            Self::Conflict(message) => (StatusCode::CONFLICT, message),
            Self::ServiceUnavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
        };

        let body = ErrorResponse {
            error: message,
            status: "error".to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize, Debug)]
struct ErrorResponse {
    error: String,
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Debug;

    fn assert_status_code<T: IntoResponse + Debug>(response: T, expected_status: StatusCode) {
        let response = response.into_response();
        assert_eq!(response.status(), expected_status);
    }

    #[test]
    fn test_app_error_to_api_error_conversion() {
        let not_found = AppError::NotFound("graph missing".to_string());
        let api_error = ApiError::from(not_found);
        assert!(matches!(api_error, ApiError::NotFound(msg) if msg == "graph missing"));

        let validation = AppError::Validation("name too long".to_string());
        let api_error = ApiError::from(validation);
        assert!(matches!(api_error, ApiError::ValidationError(msg) if msg == "name too long"));

        let duplicate = AppError::DuplicateName("Medical".to_string());
        assert!(matches!(ApiError::from(duplicate), ApiError::Conflict(msg) if msg == "Medical"));

        let active = AppError::ActiveGraphDeletion("medical".to_string());
        assert!(matches!(ApiError::from(active), ApiError::Conflict(_)));

        let init = AppError::InstanceInit("corrupt vdb_entities.json".to_string());
        assert!(matches!(ApiError::from(init), ApiError::ServiceUnavailable(_)));

        let internal_error = AppError::Io(std::io::Error::other("io error"));
        let api_error = ApiError::from(internal_error);
        assert!(matches!(api_error, ApiError::InternalError(_)));
    }

    #[test]
    fn test_api_error_response_status_codes() {
        assert_status_code(
            ApiError::InternalError("server error".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
        );
        assert_status_code(ApiError::NotFound("not found".to_string()), StatusCode::NOT_FOUND);
        assert_status_code(
            ApiError::ValidationError("invalid input".to_string()),
            StatusCode::BAD_REQUEST,
        );
        assert_status_code(
            ApiError::Unauthorized("not allowed".to_string()),
            StatusCode::UNAUTHORIZED,
        );
        assert_status_code(ApiError::Conflict("taken".to_string()), StatusCode::CONFLICT);
        assert_status_code(
            ApiError::ServiceUnavailable("down".to_string()),
            StatusCode::SERVICE_UNAVAILABLE,
        );
    }

    #[test]
    fn test_error_messages() {
        let error = ApiError::ValidationError("invalid data format".to_string());
        assert_eq!(error.to_string(), "Validation error: invalid data format");

        let error = ApiError::NotFound("graph 'x' not found".to_string());
        assert_eq!(error.to_string(), "Not found: graph 'x' not found");
    }

    #[test]
    fn test_internal_details_are_not_leaked() {
        let api_error = ApiError::from(AppError::InternalError("disk layout secret".to_string()));

        assert!(matches!(&api_error, ApiError::InternalError(msg) if msg == "Internal server error"));
        assert_eq!(api_error.to_string(), "Internal server error");
        assert_status_code(api_error, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
