//! Error types for boardvote.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Vote not found: {0}")]
    VoteNotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // === Vote Lifecycle Errors ===
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Configuration locked: {0}")]
    ConfigurationLocked(String),

    #[error("Not eligible: {0}")]
    NotEligible(String),

    #[error("Already voted: {0}")]
    AlreadyVoted(String),

    #[error("Invalid option: {0}")]
    InvalidOption(String),

    #[error("Empty eligibility: {0}")]
    EmptyEligibility(String),

    #[error("Reason required: {0}")]
    ReasonRequired(String),

    #[error("Cannot delete after opening: {0}")]
    CannotDeleteAfterOpening(String),

    #[error("Vote not open: {0}")]
    VoteNotOpen(String),

    // === Server Errors ===
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client Errors
            Self::NotFound(_) | Self::VoteNotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::NotEligible(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_)
            | Self::Validation(_)
            | Self::InvalidOption(_)
            | Self::ReasonRequired(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_)
            | Self::InvalidTransition(_)
            | Self::ConfigurationLocked(_)
            | Self::AlreadyVoted(_)
            | Self::CannotDeleteAfterOpening(_)
            | Self::VoteNotOpen(_) => StatusCode::CONFLICT,
            Self::EmptyEligibility(_) => StatusCode::UNPROCESSABLE_ENTITY,

            // 5xx Server Errors
            Self::Database(_) | Self::Config(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ExternalService(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::VoteNotFound(_) => "VOTE_NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::InvalidTransition(_) => "INVALID_TRANSITION",
            Self::ConfigurationLocked(_) => "CONFIGURATION_LOCKED",
            Self::NotEligible(_) => "NOT_ELIGIBLE",
            Self::AlreadyVoted(_) => "ALREADY_VOTED",
            Self::InvalidOption(_) => "INVALID_OPTION",
            Self::EmptyEligibility(_) => "EMPTY_ELIGIBILITY",
            Self::ReasonRequired(_) => "REASON_REQUIRED",
            Self::CannotDeleteAfterOpening(_) => "CANNOT_DELETE_AFTER_OPENING",
            Self::VoteNotOpen(_) => "VOTE_NOT_OPEN",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Returns whether the failed operation may succeed if retried.
    ///
    /// Only write conflicts (unique-index races between concurrent writers)
    /// are retryable; lifecycle errors are terminal for the call.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        // Log server errors
        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        let body = Json(json!({
            "error": {
                "code": code,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_errors_are_client_errors() {
        let errors = [
            AppError::InvalidTransition("draft -> closed".to_string()),
            AppError::ConfigurationLocked("vote is open".to_string()),
            AppError::NotEligible("user1".to_string()),
            AppError::AlreadyVoted("user1".to_string()),
            AppError::InvalidOption("opt".to_string()),
            AppError::EmptyEligibility("no voters".to_string()),
            AppError::ReasonRequired("reopen".to_string()),
            AppError::CannotDeleteAfterOpening("vote1".to_string()),
            AppError::VoteNotOpen("vote1".to_string()),
        ];

        for err in errors {
            assert!(err.status_code().is_client_error(), "{err}");
            assert!(!err.is_server_error());
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::AlreadyVoted(String::new()).error_code(),
            "ALREADY_VOTED"
        );
        assert_eq!(
            AppError::ConfigurationLocked(String::new()).error_code(),
            "CONFIGURATION_LOCKED"
        );
        assert_eq!(
            AppError::NotEligible(String::new()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(AppError::Conflict("duplicate sequence".to_string()).is_retryable());
        assert!(!AppError::Database("connection reset".to_string()).is_retryable());
    }
}
