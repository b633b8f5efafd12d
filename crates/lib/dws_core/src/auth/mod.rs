//! Authentication core.
//!
//! Password hashing and validation, signed bearer assertions, the user and
//! session stores, and [`service::AuthCore`] which ties them together for
//! login, refresh, logout and bearer resolution.

pub mod jwt;
pub mod password;
pub mod queries;
pub mod service;
pub mod store;

use std::time::Duration;

use thiserror::Error;

use crate::store::StoreError;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Account is inactive")]
    AccountInactive,

    #[error("Account is locked")]
    AccountLocked,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Weak password: {0}")]
    WeakPassword(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(constraint) => AuthError::Conflict(constraint),
            other => AuthError::Store(other),
        }
    }
}

/// Session and lockout tunables.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub bearer_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Failed attempts that trigger a lock.
    pub lockout_threshold: i32,
    pub lockout_duration: Duration,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            bearer_ttl: Duration::from_secs(24 * 60 * 60),
            refresh_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            lockout_threshold: 5,
            lockout_duration: Duration::from_secs(30 * 60),
        }
    }
}
