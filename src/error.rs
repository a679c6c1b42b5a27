use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError, services::catalog::CatalogError, state::phase::InvalidTransition,
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or missing input.
    #[error("{0}")]
    InvalidInput(String),
    /// Game, round, player or challenge missing.
    #[error("{0}")]
    NotFound(String),
    /// Wrong phase, settings locked or round count exhausted.
    #[error("{0}")]
    InvalidState(String),
    /// Duplicate name, nomination or ranking.
    #[error("{0}")]
    AlreadyExists(String),
    /// Game is full.
    #[error("{0}")]
    ResourceExhausted(String),
    /// Caller is not the host or creator required by the action.
    #[error("{0}")]
    PermissionDenied(String),
    /// Missing or unknown session token.
    #[error("{0}")]
    Unauthorized(String),
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Unexpected failure, carrying the original message.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable wire code of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => "invalid-argument",
            ServiceError::NotFound(_) => "not-found",
            ServiceError::InvalidState(_) => "failed-precondition",
            ServiceError::AlreadyExists(_) => "already-exists",
            ServiceError::ResourceExhausted(_) => "resource-exhausted",
            ServiceError::PermissionDenied(_) => "permission-denied",
            ServiceError::Unauthorized(_) => "unauthenticated",
            ServiceError::Unavailable(_) | ServiceError::Degraded => "unavailable",
            ServiceError::Internal(_) => "internal",
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable { .. } => ServiceError::Unavailable(err),
            StorageError::Conflict { .. } => ServiceError::Internal(format!(
                "transaction aborted after repeated conflicts: {err}"
            )),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        ServiceError::Internal(format!("music catalog: {err}"))
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}

/// HTTP facing error carrying a status code and a stable kind.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let status = match &err {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InvalidState(_) => StatusCode::PRECONDITION_FAILED,
            ServiceError::AlreadyExists(_) => StatusCode::CONFLICT,
            ServiceError::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Unavailable(_) | ServiceError::Degraded => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        AppError {
            status,
            code: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::from(err).into()
    }
}

/// JSON body returned for every rejected request.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable error kind, e.g. `failed-precondition`.
    pub code: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ErrorBody {
            code: self.code.to_owned(),
            message: self.message,
        });

        (self.status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_kinds_to_http_statuses() {
        let cases = [
            (
                ServiceError::InvalidInput("x".into()),
                StatusCode::BAD_REQUEST,
                "invalid-argument",
            ),
            (
                ServiceError::InvalidState("x".into()),
                StatusCode::PRECONDITION_FAILED,
                "failed-precondition",
            ),
            (
                ServiceError::AlreadyExists("x".into()),
                StatusCode::CONFLICT,
                "already-exists",
            ),
            (
                ServiceError::ResourceExhausted("x".into()),
                StatusCode::TOO_MANY_REQUESTS,
                "resource-exhausted",
            ),
            (
                ServiceError::PermissionDenied("x".into()),
                StatusCode::FORBIDDEN,
                "permission-denied",
            ),
            (
                ServiceError::Unauthorized("x".into()),
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
            ),
            (
                ServiceError::Degraded,
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
            ),
        ];

        for (err, status, code) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status(), status);
            assert_eq!(app.code(), code);
        }
    }

    #[test]
    fn storage_failures_keep_their_message() {
        let err: ServiceError = StorageError::Missing {
            path: "games/G".into(),
        }
        .into();
        assert_eq!(err.kind(), "internal");
        assert!(err.to_string().contains("games/G"));
    }
}
