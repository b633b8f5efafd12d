//! Authentication domain models.
//!
//! These are internal domain models, distinct from the HTTP DTOs in
//! `dws_api` (which use camelCase field names).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;

/// Clinical role of a portal user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
pub enum Role {
    Haematologist,
    Physician,
    DataCapturer,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Haematologist => "haematologist",
            Role::Physician => "physician",
            Role::DataCapturer => "data_capturer",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "haematologist" => Ok(Role::Haematologist),
            "physician" => Ok(Role::Physician),
            "data_capturer" => Ok(Role::DataCapturer),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Administrative privilege on top of the role. Absent means none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "admin_level", rename_all = "snake_case")]
pub enum AdminLevel {
    UserManager,
    SuperAdmin,
}

impl AdminLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminLevel::UserManager => "user_manager",
            AdminLevel::SuperAdmin => "super_admin",
        }
    }
}

/// Domain user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub username: String,
    /// Stored lower-case.
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub admin_level: Option<AdminLevel>,
    pub is_active: bool,
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Locked while `locked_until` lies in the future.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    pub fn is_super_admin(&self) -> bool {
        self.admin_level == Some(AdminLevel::SuperAdmin)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Fields needed to create a user. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub admin_level: Option<AdminLevel>,
}

/// Persisted login session. Tokens are stored as SHA-256 hex digests.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub id: Id,
    pub user_id: Id,
    pub bearer_hash: String,
    pub refresh_hash: String,
    pub bearer_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub ip_address: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
}

/// Bearer/refresh pair handed back on login and refresh.
#[derive(Debug, Clone)]
pub struct LoginResult {
    pub bearer: String,
    pub refresh: String,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

/// What a signed assertion may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Session,
    PasswordReset,
}

/// JWT claims embedded in bearer and reset tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: user ID.
    pub sub: String,
    pub purpose: Purpose,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Random token id so tokens minted in the same second differ.
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_level: Option<AdminLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Extra claims attached to session bearers.
#[derive(Debug, Clone, Default)]
pub struct ExtraClaims {
    pub role: Option<Role>,
    pub admin_level: Option<AdminLevel>,
    pub email: Option<String>,
}

impl ExtraClaims {
    pub fn for_user(user: &User) -> Self {
        Self {
            role: Some(user.role),
            admin_level: user.admin_level,
            email: Some(user.email.clone()),
        }
    }
}

/// Where a request came from; recorded on sessions, tickets and audit events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientMeta {
    pub ip: String,
    pub user_agent: String,
}

impl ClientMeta {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Who triggered an admin operation.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: Id,
    pub meta: ClientMeta,
}

/// Input for creating an account with a plaintext password.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub admin_level: Option<AdminLevel>,
}
