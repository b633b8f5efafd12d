//! HTTP request/response bodies.
//!
//! Wire shapes use camelCase; the core's domain models stay snake_case.

use chrono::{DateTime, Utc};
use dws_core::models::auth::{AdminLevel, LoginResult, Role, User};
use dws_core::models::dropbox::DropboxStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Plain acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
    pub success: bool,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Public view of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub admin_level: Option<AdminLevel>,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            admin_level: user.admin_level,
            is_active: user.is_active,
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub refresh_token: String,
    pub user: UserInfo,
    pub expires_at: DateTime<Utc>,
}

impl From<LoginResult> for TokenResponse {
    fn from(result: LoginResult) -> Self {
        Self {
            user: UserInfo::from(&result.user),
            token: result.bearer,
            refresh_token: result.refresh,
            expires_at: result.expires_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Password reset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateResetCodeRequest {
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateResetCodeResponse {
    pub token: String,
    pub message: String,
    pub success: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

// ---------------------------------------------------------------------------
// Dropbox admin
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropboxAuthorizeRequest {
    pub app_key: String,
    #[serde(default)]
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropboxAuthorizeResponse {
    pub auth_url: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropboxCallbackRequest {
    pub code: String,
    pub app_key: String,
    pub app_secret: String,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Empty means the Dropbox root.
    #[serde(default)]
    pub parent_folder: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DropboxCallbackResponse {
    pub message: String,
    pub status: DropboxStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropboxRefreshResponse {
    pub message: String,
    pub token_expiry: DateTime<Utc>,
}
