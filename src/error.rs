//! Error types for the circulation engine

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Reason codes attached to circulation errors and API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    Success = 0,
    Failure = 1,
    DbFailure = 2,
    NotFound = 3,
    BadValue = 4,
    NoCopiesAvailable = 5,
    ItemInactive = 6,
    DuplicateLoan = 7,
    DuplicateReservation = 8,
    LoanLimitExceeded = 9,
    HasOverdueLoan = 10,
    CopiesAvailable = 11,
    EmptyBucket = 12,
    OutstandingCirculation = 13,
    HoldsPending = 14,
    ExtensionLimitReached = 15,
    ConcurrentUpdate = 16,
    InvalidTransition = 17,
    InvariantViolation = 18,
}

impl ErrorCode {
    /// Stable wire name of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Success => "SUCCESS",
            ErrorCode::Failure => "FAILURE",
            ErrorCode::DbFailure => "DB_FAILURE",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::BadValue => "BAD_VALUE",
            ErrorCode::NoCopiesAvailable => "NO_COPIES_AVAILABLE",
            ErrorCode::ItemInactive => "ITEM_INACTIVE",
            ErrorCode::DuplicateLoan => "DUPLICATE_LOAN",
            ErrorCode::DuplicateReservation => "DUPLICATE_RESERVATION",
            ErrorCode::LoanLimitExceeded => "LOAN_LIMIT_EXCEEDED",
            ErrorCode::HasOverdueLoan => "HAS_OVERDUE_LOAN",
            ErrorCode::CopiesAvailable => "COPIES_AVAILABLE",
            ErrorCode::EmptyBucket => "EMPTY_BUCKET",
            ErrorCode::OutstandingCirculation => "OUTSTANDING_CIRCULATION",
            ErrorCode::HoldsPending => "HOLDS_PENDING",
            ErrorCode::ExtensionLimitReached => "EXTENSION_LIMIT_REACHED",
            ErrorCode::ConcurrentUpdate => "CONCURRENT_UPDATE",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::InvariantViolation => "INVARIANT_VIOLATION",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict ({0}): {1}")]
    Conflict(ErrorCode, String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Policy violation ({0}): {1}")]
    PolicyViolation(ErrorCode, String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Copy counts failed to reconcile. Always a defect, never a user error.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Reason code carried by this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Conflict(code, _) | AppError::PolicyViolation(code, _) => *code,
            AppError::InvalidTransition(_) => ErrorCode::InvalidTransition,
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::InvariantViolation(_) => ErrorCode::InvariantViolation,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Internal(_) => ErrorCode::Failure,
        }
    }

    /// True for the optimistic-lock failure that callers may retry
    pub fn is_concurrent_update(&self) -> bool {
        matches!(self, AppError::Conflict(ErrorCode::ConcurrentUpdate, _))
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(_, msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::InvalidTransition(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::PolicyViolation(_, msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvariantViolation(msg) => {
                tracing::error!("Invariant violation reached the API layer: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: code.as_str().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
