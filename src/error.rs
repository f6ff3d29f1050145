//! Error taxonomy shared by the services
//!
//! Component errors (`LlmError`, `StoreError`, `AuthError`) convert into
//! [`AppError`]. The mapping to HTTP statuses lives in `api::server`.

use thiserror::Error;

use crate::auth::AuthError;
use crate::llm::LlmError;
use crate::store::StoreError;
use crate::validation::FieldErrors;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request data: {0}")]
    Validation(FieldErrors),
    /// A well-formed request that breaks a rule; the message goes to the caller
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("upstream provider error: {0}")]
    UpstreamProvider(#[from] LlmError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Validation failure on a single field
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation(FieldErrors::single(field, message))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    /// Stable code written to the generation error log
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) => "VALIDATION_ERROR",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::UpstreamProvider(err) => err.code(),
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<FieldErrors> for AppError {
    fn from(errors: FieldErrors) -> Self {
        AppError::Validation(errors)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => AppError::NotFound("Task not found".to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials(message) => AppError::Unauthorized(message),
            AuthError::InvalidSession => AppError::Unauthorized("Unauthorized".to_string()),
            AuthError::Rejected(message) => AppError::BadRequest(message),
            other => AppError::Internal(other.to_string()),
        }
    }
}
