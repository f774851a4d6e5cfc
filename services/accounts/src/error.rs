use keystone_domain::pagination::PageError;

use crate::domain::filter::FilterError;

/// Accounts service error variants.
#[derive(Debug, thiserror::Error)]
pub enum AccountsError {
    #[error("user not found")]
    UserNotFound,
    #[error("role not found: {0}")]
    RoleNotFound(String),
    #[error("username already exists")]
    UsernameAlreadyExists,
    #[error("email already exists")]
    EmailAlreadyExists,
    #[error("invalid credential")]
    InvalidCredential,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("service unavailable")]
    Unavailable(#[source] anyhow::Error),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

/// Coarse error taxonomy surfaced to transport layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    Conflict,
    InvalidCredential,
    ValidationError,
    Unavailable,
    Internal,
}

impl AccountsError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::RoleNotFound(_) => "ROLE_NOT_FOUND",
            Self::UsernameAlreadyExists => "USERNAME_ALREADY_EXISTS",
            Self::EmailAlreadyExists => "EMAIL_ALREADY_EXISTS",
            Self::InvalidCredential => "INVALID_CREDENTIAL",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UserNotFound | Self::RoleNotFound(_) => ErrorCategory::NotFound,
            Self::UsernameAlreadyExists | Self::EmailAlreadyExists => ErrorCategory::Conflict,
            Self::InvalidCredential => ErrorCategory::InvalidCredential,
            Self::Validation(_) => ErrorCategory::ValidationError,
            Self::Unavailable(_) => ErrorCategory::Unavailable,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }
}

impl From<FilterError> for AccountsError {
    fn from(e: FilterError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<PageError> for AccountsError {
    fn from(e: PageError) -> Self {
        Self::Validation(e.to_string())
    }
}
