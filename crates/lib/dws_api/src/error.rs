//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use dws_core::auth::AuthError;
use dws_core::dropbox::DropboxError;
use dws_core::mail::MailError;
use dws_core::reset::ResetError;
use dws_core::store::StoreError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Account locked: {0}")]
    Locked(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Dropbox needs to be re-authorized")]
    NeedsReauth,

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error("Upstream error: {0}")]
    External(String),

    #[error("Database unavailable: {0}")]
    DbUnavailable(String),

    #[error("Internal server error")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, message) = match &self {
            AppError::Validation(m) => (StatusCode::BAD_REQUEST, "validation_error", m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, "unauthorized", m.as_str()),
            AppError::Locked(m) => (StatusCode::FORBIDDEN, "account_locked", m.as_str()),
            AppError::Forbidden(m) => (StatusCode::FORBIDDEN, "forbidden", m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, "not_found", m.as_str()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, "conflict", m.as_str()),
            AppError::NeedsReauth => (
                StatusCode::CONFLICT,
                "needs_reauth",
                "Dropbox needs to be re-authorized",
            ),
            AppError::TooManyRequests(m) => {
                (StatusCode::TOO_MANY_REQUESTS, "too_many_requests", m.as_str())
            }
            AppError::External(m) => (StatusCode::BAD_GATEWAY, "external_error", m.as_str()),
            AppError::DbUnavailable(m) => {
                (StatusCode::SERVICE_UNAVAILABLE, "db_unavailable", m.as_str())
            }
            AppError::Internal(detail) => {
                error!(error = %detail, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error",
                )
            }
        };
        let body = Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        });
        (status, body).into_response()
    }
}

/// User-facing text for a violated unique constraint.
fn conflict_message(constraint: &str) -> String {
    if constraint.contains("email") {
        "A user with this email already exists".into()
    } else if constraint.contains("username") {
        "A user with this username already exists".into()
    } else {
        "Resource already exists".into()
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Conflict(constraint) => AppError::Conflict(conflict_message(&constraint)),
            StoreError::Timeout(after) => {
                AppError::DbUnavailable(format!("database call timed out after {after:?}"))
            }
            StoreError::Database(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials
            | AuthError::InvalidToken
            | AuthError::AccountInactive => AppError::Unauthorized(e.to_string()),
            AuthError::AccountLocked => AppError::Locked(
                "Too many failed login attempts; try again later".into(),
            ),
            AuthError::UserNotFound => AppError::NotFound(e.to_string()),
            AuthError::InvalidEmail(_)
            | AuthError::InvalidUsername(_)
            | AuthError::WeakPassword(_) => AppError::Validation(e.to_string()),
            AuthError::Conflict(constraint) => AppError::Conflict(conflict_message(&constraint)),
            AuthError::Store(e) => AppError::from(e),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<ResetError> for AppError {
    fn from(e: ResetError) -> Self {
        match e {
            ResetError::UserNotFound => AppError::NotFound(e.to_string()),
            ResetError::UserInactive => AppError::Forbidden(e.to_string()),
            ResetError::TooManyRequests => AppError::TooManyRequests(
                "Too many password reset requests; try again later".into(),
            ),
            ResetError::Invalid => AppError::NotFound("Invalid or expired reset code".into()),
            ResetError::WeakPassword(_) => AppError::Validation(e.to_string()),
            ResetError::Store(e) => AppError::from(e),
            ResetError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<DropboxError> for AppError {
    fn from(e: DropboxError) -> Self {
        match e {
            DropboxError::NotConfigured => AppError::NotFound(e.to_string()),
            DropboxError::NeedsReauth | DropboxError::CorruptCiphertext => AppError::NeedsReauth,
            DropboxError::Exchange(_) | DropboxError::Probe(_) => {
                AppError::External(e.to_string())
            }
            DropboxError::Validation(msg) => AppError::Validation(msg),
            DropboxError::AlreadyExists => AppError::Conflict(e.to_string()),
            DropboxError::Store(msg) | DropboxError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<MailError> for AppError {
    fn from(e: MailError) -> Self {
        match e {
            MailError::Invalid(msg) => AppError::Validation(msg),
            MailError::NotConfigured | MailError::CredentialsUnreadable => {
                AppError::Conflict(e.to_string())
            }
            MailError::Send(_) | MailError::Timeout => AppError::External(e.to_string()),
            MailError::Store(e) => AppError::from(e),
        }
    }
}
