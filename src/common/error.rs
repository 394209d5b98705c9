// Error handling types for the API

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::fmt;
use tracing::{error, warn};

use super::validation::ValidationResult;
use crate::access::gate::GateError;
use crate::access::tokens::TokenError;
use crate::payments::ledger::LedgerError;
use crate::payments::services::SubmissionError;
use crate::services::settings::SettingsError;

/// API error types
#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Gone(String),
    InternalServer(String),
    ServiceUnavailable(String),
    DatabaseError(sqlx::Error),
    ValidationError(String),
    UnsupportedMedia(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::Gone(msg) => write!(f, "Gone: {}", msg),
            ApiError::InternalServer(msg) => write!(f, "Internal Server Error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service Unavailable: {}", msg),
            ApiError::DatabaseError(e) => write!(f, "Database Error: {}", e),
            ApiError::ValidationError(msg) => write!(f, "Validation Error: {}", msg),
            ApiError::UnsupportedMedia(msg) => write!(f, "Unsupported Media: {}", msg),
        }
    }
}

/// JSON error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message, code) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, "UNAUTHORIZED"),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, "FORBIDDEN"),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, "BAD_REQUEST"),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "NOT_FOUND"),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, "CONFLICT"),
            ApiError::Gone(msg) => (StatusCode::GONE, msg, "GONE"),
            ApiError::InternalServer(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                msg,
                "INTERNAL_SERVER_ERROR",
            ),
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                msg,
                "SERVICE_UNAVAILABLE",
            ),
            ApiError::DatabaseError(e) => {
                error!(error = %e, "Database error occurred");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database operation failed".to_string(),
                    "DATABASE_ERROR",
                )
            }
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg, "VALIDATION_ERROR"),
            ApiError::UnsupportedMedia(msg) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                msg,
                "UNSUPPORTED_MEDIA_TYPE",
            ),
        };

        let error_response = ErrorResponse {
            error: error_message,
            code: code.to_string(),
        };

        (status, Json(error_response)).into_response()
    }
}

/// Helper function to convert ValidationResult to ApiError
impl From<ValidationResult> for ApiError {
    fn from(result: ValidationResult) -> Self {
        if result.is_valid {
            ApiError::InternalServer(
                "Validation result was valid but converted to error".to_string(),
            )
        } else {
            let error_messages: Vec<String> = result
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            ApiError::ValidationError(error_messages.join(", "))
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        ApiError::DatabaseError(e)
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Conflict { .. } | LedgerError::AlreadyVerified(_) => {
                ApiError::Conflict(e.to_string())
            }
            LedgerError::Expired(_) => ApiError::Gone(e.to_string()),
            LedgerError::NotFound(_) => ApiError::NotFound(e.to_string()),
            LedgerError::ReferenceCollision => ApiError::ServiceUnavailable(e.to_string()),
            LedgerError::Database(db) => ApiError::DatabaseError(db),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::InvalidToken => ApiError::NotFound(e.to_string()),
            TokenError::Expired => ApiError::Gone(e.to_string()),
            TokenError::NotOwner => ApiError::Forbidden(e.to_string()),
            TokenError::AlreadyUsed => ApiError::Conflict(e.to_string()),
            TokenError::GrantUnavailable | TokenError::GrantFailed(_) => {
                warn!(error = %e, "Access grant could not be created");
                ApiError::ServiceUnavailable(e.to_string())
            }
            TokenError::Database(db) => ApiError::DatabaseError(db),
        }
    }
}

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        match e {
            GateError::NotConfigured | GateError::Chat(_) => {
                warn!(error = %e, "Membership gate unavailable");
                ApiError::ServiceUnavailable(e.to_string())
            }
            GateError::Token(inner) => inner.into(),
            GateError::Database(db) => ApiError::DatabaseError(db),
        }
    }
}

impl From<SettingsError> for ApiError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::DatabaseError(db) => ApiError::DatabaseError(db),
            SettingsError::NotFound(_) => ApiError::NotFound(e.to_string()),
            SettingsError::InvalidValue { .. } => ApiError::InternalServer(e.to_string()),
        }
    }
}

impl From<SubmissionError> for ApiError {
    fn from(e: SubmissionError) -> Self {
        match e {
            SubmissionError::NoPendingRequest(_) => ApiError::NotFound(e.to_string()),
            SubmissionError::NotVerified(_) => ApiError::Forbidden(e.to_string()),
            SubmissionError::UnsupportedImage => ApiError::UnsupportedMedia(e.to_string()),
            SubmissionError::Ledger(inner) => inner.into(),
            SubmissionError::Token(inner) => inner.into(),
        }
    }
}
