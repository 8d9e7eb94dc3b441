use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use derive_more::Display;
use serde_json::json;
use tracing::error;

use crate::{backend::BackendError, validation::ValidationError};

const GENERIC_MESSAGE: &str = "Something went wrong, contact your system administrator";

/// Every handler error ends up as `{"error": "..."}` with a matching status.
#[derive(Debug, Display)]
pub enum ApiError {
    #[display(fmt = "{}", _0)]
    Validation(ValidationError),

    #[display(fmt = "{}", _0)]
    BadRequest(String),

    #[display(fmt = "Not authenticated")]
    Unauthenticated,

    #[display(fmt = "{}", _0)]
    Forbidden(String),

    #[display(fmt = "{}", _0)]
    NotFound(String),

    #[display(fmt = "{}", _0)]
    Backend(BackendError),

    /// A backend failure reported with a status chosen by the handler
    #[display(fmt = "{}", source)]
    Upstream {
        status: StatusCode,
        source: BackendError,
    },
}

impl ApiError {
    pub fn upstream(status: StatusCode, source: BackendError) -> Self {
        ApiError::Upstream { status, source }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Backend(e) | ApiError::Upstream { source: e, .. } if e.is_internal() => {
                GENERIC_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e)
    }
}

impl From<BackendError> for ApiError {
    fn from(e: BackendError) -> Self {
        ApiError::Backend(e)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream { source, .. } if source.is_internal() => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Upstream { status, .. } => *status,
            ApiError::Backend(e) => match e {
                BackendError::InvalidCredentials
                | BackendError::InvalidResetToken
                | BackendError::Invalid(_) => StatusCode::BAD_REQUEST,
                BackendError::InvalidSession => StatusCode::UNAUTHORIZED,
                BackendError::Conflict(_) => StatusCode::CONFLICT,
                BackendError::Rejected(_)
                | BackendError::Database(_)
                | BackendError::Token(_)
                | BackendError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "Request failed");
        }

        HttpResponse::build(status).json(json!({ "error": self.message() }))
    }
}
