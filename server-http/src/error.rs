use crate::models::ErrorResponse;
use crate::validation::ValidationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::Error;

/// Handler error: either rejected at the boundary or raised by the services.
#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Service(Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Service(err) => match err {
                Error::InvalidArgument(_) | Error::InvalidState(_) => StatusCode::BAD_REQUEST,
                Error::NotFound | Error::ItemNotFound { .. } => StatusCode::NOT_FOUND,
                Error::Conflict(_)
                | Error::ItemAlreadyDismissed { .. }
                | Error::ItemNotDismissed { .. } => StatusCode::CONFLICT,
                Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                Error::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "invalid_argument",
            ApiError::Service(err) => err.code(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Validation(err) => write!(f, "{}", err),
            ApiError::Service(err) => write!(f, "{}", err),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::Validation(err)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError::Service(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
