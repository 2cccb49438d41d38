//! HTTP error responses.
//!
//! Handlers return [`ApiError`]; domain errors convert into it so handler
//! bodies can use `?` on repository and service calls.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Error;

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Everything a route can answer with besides a success body, one variant
/// per response status.
#[derive(Debug)]
pub enum ApiError {
    /// 400: the request itself is malformed (unknown tier, bad parameter).
    BadRequest(String),
    /// 404: the addressed entity does not exist.
    NotFound(String),
    /// 409: the request conflicts with existing state.
    Conflict(String),
    /// 422: the payload parsed but failed validation.
    Validation(String),
    /// 502: the upstream API rejected or garbled a call.
    Upstream(String),
    /// 503: a required service was not wired into this server instance.
    Unavailable(String),
    /// 500: anything unexpected. The cause is logged, never leaked.
    Internal,
}

/// Wire shape of an error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    fn message(self) -> String {
        match self {
            Self::BadRequest(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Validation(m)
            | Self::Upstream(m)
            | Self::Unavailable(m) => m,
            Self::Internal => "An internal error occurred".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let body = ErrorBody {
            code,
            message: self.message(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound { entity_type, id } => {
                Self::NotFound(format!("{entity_type} with id '{id}' not found"))
            }
            Error::Validation(msg) => Self::Validation(msg),
            Error::Upstream(e) => Self::Upstream(e.to_string()),
            err => {
                tracing::error!("request failed: {err}");
                Self::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_per_variant() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Unavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_from_not_found() {
        let api_err: ApiError = Error::not_found("LiveStream", "vid123").into();

        assert_eq!(api_err.status(), StatusCode::NOT_FOUND);
        assert!(api_err.message().contains("vid123"));
    }

    #[test]
    fn test_internal_hides_cause() {
        let api_err: ApiError = Error::config("bad DATABASE_URL").into();

        assert_eq!(api_err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!api_err.message().contains("DATABASE_URL"));
    }
}
