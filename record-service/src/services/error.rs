use service_core::error::AppError;
use thiserror::Error;

use crate::models::{FieldAccessError, MalformedPredicate, NoSatisfiedIdentityGroup};
use crate::services::policy::DenyReason;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User already exists")]
    DuplicatedUser,

    #[error("Invalid auth data: {0}")]
    InvalidAuthData(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Record not found")]
    RecordNotFound,

    #[error("Permission denied: {0}")]
    PermissionDenied(#[from] DenyReason),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error(transparent)]
    MalformedPredicate(#[from] MalformedPredicate),

    #[error(transparent)]
    NoSatisfiedIdentityGroup(#[from] NoSatisfiedIdentityGroup),

    #[error(transparent)]
    FieldAccess(#[from] FieldAccessError),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::from(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::DuplicatedUser => {
                AppError::Conflict(anyhow::anyhow!("User already exists"))
            }
            ServiceError::InvalidAuthData(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::InvalidToken => AppError::Unauthorized(anyhow::anyhow!("Invalid token")),
            ServiceError::UserNotFound => AppError::NotFound(anyhow::anyhow!("User not found")),
            ServiceError::RecordNotFound => AppError::NotFound(anyhow::anyhow!("Record not found")),
            ServiceError::PermissionDenied(DenyReason::NotAuthenticated) => {
                AppError::Unauthorized(anyhow::anyhow!(DenyReason::NotAuthenticated))
            }
            ServiceError::PermissionDenied(reason) => AppError::Forbidden(anyhow::anyhow!(reason)),
            ServiceError::ValidationError(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::MalformedPredicate(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::NoSatisfiedIdentityGroup(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::FieldAccess(e @ FieldAccessError::RuleTableReplaceFailed(_)) => {
                AppError::BadRequest(anyhow::anyhow!(e))
            }
            ServiceError::FieldAccess(e) => AppError::Forbidden(anyhow::anyhow!(e)),
        }
    }
}
