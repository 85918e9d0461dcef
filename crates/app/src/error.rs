use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::counter;
use thiserror::Error;
use tracing::error;

use jobboard_core::ValidationError;
use jobboard_storage::RepositoryError;

use crate::problem::ProblemResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("email is already registered")]
    DuplicateEmail,
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Unauthorized(&'static str),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Maps a repository failure while loading or writing `entity`.
    ///
    /// Usage: `.map_err(ApiError::lookup("job"))?`
    pub fn lookup(entity: &'static str) -> impl Fn(RepositoryError) -> ApiError {
        move |err| match err {
            RepositoryError::NotFound => ApiError::NotFound(entity),
            other => ApiError::from(other),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::DuplicateEmail => (StatusCode::CONFLICT, "duplicate_email"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation_failed"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        Self::Validation(err.0)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound("resource"),
            RepositoryError::Conflict(reason) => Self::Conflict(reason.to_string()),
            RepositoryError::MissingReference => Self::NotFound("referenced resource"),
            RepositoryError::InUse => Self::Conflict("resource is still referenced".to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, problem_type) = self.status_and_type();
        counter!("api_errors_total", "type" => problem_type).increment(1);
        let detail = match &self {
            Self::Internal(cause) => {
                error!(stage = "http", error = %cause, "request failed");
                "an unexpected error occurred".to_string()
            }
            other => other.to_string(),
        };
        ProblemResponse::new(status, problem_type, detail).into_response()
    }
}
