//! Error types for the library server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Stable numeric error codes returned in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NotFound = 4,
    BadValue = 5,
    Duplicate = 6,
    BookNotAvailable = 7,
    NotBorrowable = 8,
    AlreadyBorrowed = 9,
    MaxBorrowsReached = 10,
    InvalidState = 11,
    InvalidAmount = 12,
    DuplicateTransaction = 13,
}

/// Expected, user-facing outcomes of the lending, fine and payment rules.
///
/// Each kind carries exactly one message so callers and tests can match on the
/// kind while users still get a readable explanation.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LendingError {
    #[error("Sorry, this book is currently not available for borrowing.")]
    Unavailable,

    #[error("E-books cannot be borrowed. You can read them online or download them instead.")]
    NotBorrowable,

    #[error("You have already borrowed this book. You cannot borrow the same book multiple times.")]
    DuplicateBorrowing,

    #[error("You have reached the maximum borrowing limit. Please return a book before borrowing another one.")]
    LimitExceeded,

    #[error("This record is not in a state that allows the requested operation.")]
    InvalidState,

    #[error("Amount must be greater than zero.")]
    InvalidAmount,

    #[error("A payment with this transaction reference already exists.")]
    DuplicateTransaction,

    #[error("Record not found.")]
    NotFound,
}

impl LendingError {
    fn status_and_code(self) -> (StatusCode, ErrorCode) {
        match self {
            LendingError::Unavailable => (StatusCode::CONFLICT, ErrorCode::BookNotAvailable),
            LendingError::NotBorrowable => (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::NotBorrowable),
            LendingError::DuplicateBorrowing => (StatusCode::CONFLICT, ErrorCode::AlreadyBorrowed),
            LendingError::LimitExceeded => {
                (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::MaxBorrowsReached)
            }
            LendingError::InvalidState => (StatusCode::CONFLICT, ErrorCode::InvalidState),
            LendingError::InvalidAmount => (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::InvalidAmount),
            LendingError::DuplicateTransaction => {
                (StatusCode::CONFLICT, ErrorCode::DuplicateTransaction)
            }
            LendingError::NotFound => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Lending(#[from] LendingError),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Domain kind carried by this error, if any
    pub fn lending(&self) -> Option<LendingError> {
        match self {
            AppError::Lending(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
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
        let (status, code, message) = match &self {
            AppError::Lending(kind) => {
                let (status, code) = kind.status_and_code();
                (status, code, kind.to_string())
            }
            AppError::Authentication(msg) => {
                (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::Authorization(msg) => {
                (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized, msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorCode::NotFound, msg.clone()),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue, msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::DbFailure,
                    "Database error".to_string(),
                )
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, ErrorCode::Duplicate, msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Failure,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

/// True when a database error is a unique-constraint violation on the named constraint
pub(crate) fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() && db_err.constraint() == Some(constraint)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const ALL_KINDS: [LendingError; 8] = [
        LendingError::Unavailable,
        LendingError::NotBorrowable,
        LendingError::DuplicateBorrowing,
        LendingError::LimitExceeded,
        LendingError::InvalidState,
        LendingError::InvalidAmount,
        LendingError::DuplicateTransaction,
        LendingError::NotFound,
    ];

    #[test]
    fn every_kind_has_its_own_message() {
        let messages: HashSet<String> = ALL_KINDS.iter().map(|k| k.to_string()).collect();
        assert_eq!(messages.len(), ALL_KINDS.len());
    }

    #[test]
    fn every_kind_has_its_own_code() {
        let codes: HashSet<u32> = ALL_KINDS
            .iter()
            .map(|k| k.status_and_code().1 as u32)
            .collect();
        assert_eq!(codes.len(), ALL_KINDS.len());
    }

    #[test]
    fn lending_errors_keep_their_kind_through_app_error() {
        let err: AppError = LendingError::LimitExceeded.into();
        assert_eq!(err.lending(), Some(LendingError::LimitExceeded));
        assert!(err.to_string().contains("maximum borrowing limit"));
    }

    #[test]
    fn status_codes_follow_the_error_kind() {
        let response = AppError::from(LendingError::NotFound).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = AppError::from(LendingError::Unavailable).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = AppError::Internal("boom".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
