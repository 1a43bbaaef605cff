//! Error types for rankx.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Stable error categories the calling layer maps to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed or out-of-range input.
    Validation,
    /// The request conflicts with the current state.
    Conflict,
    /// A referenced record does not exist.
    NotFound,
    /// The caller may not perform this action.
    Forbidden,
    /// Storage or synchronization failure.
    Internal,
}

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Validation ===
    #[error("Validation error: {0}")]
    Validation(String),

    // === Not found ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Category not found: {0}")]
    CategoryNotFound(String),

    #[error("Membership not found: {0}")]
    MembershipNotFound(String),

    // === Forbidden ===
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("You cannot review your own application")]
    SelfApproval,

    #[error("You cannot delete your own account")]
    SelfDeletion,

    #[error("Cannot delete another admin")]
    AdminProtected,

    // === State conflicts ===
    #[error("Cannot vote for yourself")]
    SelfVote,

    #[error("Category is not active: {0}")]
    CategoryInactive(String),

    #[error("User is not an approved member of this category")]
    TargetNotEligible,

    #[error("Already voted in this category")]
    AlreadyVoted,

    #[error("Application already exists: {0}")]
    DuplicateApplication(String),

    #[error("Already a member of another category: {0}")]
    AlreadyInAnotherCategory(String),

    #[error("Switching categories requires explicit confirmation")]
    ConfirmationRequired,

    #[error("Application is already {0}")]
    NotPending(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // === Server Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Counter synchronization failed: {0}")]
    CounterSync(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the stable category of this error.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::NotFound(_)
            | Self::UserNotFound(_)
            | Self::CategoryNotFound(_)
            | Self::MembershipNotFound(_) => ErrorCategory::NotFound,
            Self::Forbidden(_) | Self::SelfApproval | Self::SelfDeletion | Self::AdminProtected => {
                ErrorCategory::Forbidden
            }
            Self::SelfVote
            | Self::CategoryInactive(_)
            | Self::TargetNotEligible
            | Self::AlreadyVoted
            | Self::DuplicateApplication(_)
            | Self::AlreadyInAnotherCategory(_)
            | Self::ConfirmationRequired
            | Self::NotPending(_)
            | Self::Conflict(_) => ErrorCategory::Conflict,
            Self::Database(_) | Self::CounterSync(_) | Self::Config(_) | Self::Internal(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Forbidden => StatusCode::FORBIDDEN,
            ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::CategoryNotFound(_) => "CATEGORY_NOT_FOUND",
            Self::MembershipNotFound(_) => "MEMBERSHIP_NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::SelfApproval => "SELF_APPROVAL",
            Self::SelfDeletion => "SELF_DELETION",
            Self::AdminProtected => "ADMIN_PROTECTED",
            Self::SelfVote => "SELF_VOTE",
            Self::CategoryInactive(_) => "CATEGORY_INACTIVE",
            Self::TargetNotEligible => "TARGET_NOT_ELIGIBLE",
            Self::AlreadyVoted => "ALREADY_VOTED",
            Self::DuplicateApplication(_) => "DUPLICATE_APPLICATION",
            Self::AlreadyInAnotherCategory(_) => "ALREADY_IN_ANOTHER_CATEGORY",
            Self::ConfirmationRequired => "CONFIRMATION_REQUIRED",
            Self::NotPending(_) => "NOT_PENDING",
            Self::Conflict(_) => "CONFLICT",
            Self::Database(_) => "DATABASE_ERROR",
            Self::CounterSync(_) => "COUNTER_SYNC_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self.category(), ErrorCategory::Internal)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "category": self.category(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}
