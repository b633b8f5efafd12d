//! Password reset: request a code by email, exchange the code for a signed
//! token, then spend the token to set a new password.

pub mod flow;
pub mod store;

use std::time::Duration;

use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Password reset errors.
#[derive(Debug, Error)]
pub enum ResetError {
    #[error("User not found")]
    UserNotFound,

    #[error("Account is inactive")]
    UserInactive,

    #[error("Too many password reset requests")]
    TooManyRequests,

    /// Unknown, expired or already used code or token.
    #[error("Invalid or expired reset code or token")]
    Invalid,

    #[error("Weak password: {0}")]
    WeakPassword(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for ResetError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::WeakPassword(msg) => ResetError::WeakPassword(msg),
            AuthError::InvalidToken => ResetError::Invalid,
            AuthError::Store(e) => ResetError::Store(e),
            other => ResetError::Internal(other.to_string()),
        }
    }
}

/// Reset tunables.
#[derive(Debug, Clone)]
pub struct ResetPolicy {
    pub ticket_ttl: Duration,
    /// Rolling window the request caps apply to.
    pub window: Duration,
    pub per_user_cap: i64,
    pub per_ip_cap: i64,
    /// Delete every session of the user after a successful reset.
    pub revoke_sessions: bool,
    pub mail_timeout: Duration,
}

impl Default for ResetPolicy {
    fn default() -> Self {
        Self {
            ticket_ttl: Duration::from_secs(15 * 60),
            window: Duration::from_secs(60 * 60),
            per_user_cap: 3,
            per_ip_cap: 5,
            revoke_sessions: true,
            mail_timeout: Duration::from_secs(30),
        }
    }
}
