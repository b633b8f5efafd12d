//! Dropbox integration models.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;

/// A token this close to expiry is treated as stale.
pub const REFRESH_SKEW: Duration = Duration::minutes(5);

/// Consecutive refresh failures after which an admin must re-authorize.
pub const REAUTH_THRESHOLD: i32 = 3;

/// Persisted Dropbox OAuth configuration (singleton row).
///
/// `*_sealed` fields hold `CryptoBox` output, never plaintext.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct DropboxConfig {
    pub app_key: String,
    pub app_secret_sealed: String,
    pub refresh_token_sealed: String,
    pub access_token_sealed: String,
    pub token_expiry: Option<DateTime<Utc>>,
    pub parent_folder: String,
    pub is_connected: bool,
    pub last_refresh_success: Option<DateTime<Utc>>,
    pub last_refresh_attempt: Option<DateTime<Utc>>,
    pub consecutive_failures: i32,
    pub last_error: Option<String>,
    pub created_by: Option<Id>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DropboxConfig {
    /// Expired or within [`REFRESH_SKEW`] of expiry. A missing expiry counts
    /// as expired.
    pub fn is_token_expired(&self, now: DateTime<Utc>) -> bool {
        match self.token_expiry {
            Some(expiry) => now + REFRESH_SKEW >= expiry,
            None => true,
        }
    }

    /// Only a fresh authorize can recover from this.
    pub fn needs_reconnection(&self) -> bool {
        self.consecutive_failures >= REAUTH_THRESHOLD || self.refresh_token_sealed.is_empty()
    }

    pub fn state(&self, now: DateTime<Utc>) -> ConnectionState {
        if self.needs_reconnection() {
            ConnectionState::NeedsReauth
        } else if self.is_token_expired(now) {
            ConnectionState::Stale
        } else {
            ConnectionState::Connected
        }
    }
}

/// Lifecycle state derived from the stored configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Unconfigured,
    Connected,
    Stale,
    NeedsReauth,
}

/// Token endpoint response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: i64,
    /// Only present on the initial code exchange.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Secret-free view of the integration for admin screens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropboxStatus {
    pub configured: bool,
    pub state: ConnectionState,
    pub is_connected: bool,
    pub token_expiry: Option<DateTime<Utc>>,
    pub last_refresh_success: Option<DateTime<Utc>>,
    pub last_refresh_attempt: Option<DateTime<Utc>>,
    pub consecutive_failures: i32,
    pub last_error: Option<String>,
    pub needs_reconnection: bool,
    pub parent_folder: Option<String>,
    pub app_key: Option<String>,
    pub background_refresh: bool,
}

impl DropboxStatus {
    pub fn unconfigured(background_refresh: bool) -> Self {
        Self {
            configured: false,
            state: ConnectionState::Unconfigured,
            is_connected: false,
            token_expiry: None,
            last_refresh_success: None,
            last_refresh_attempt: None,
            consecutive_failures: 0,
            last_error: None,
            needs_reconnection: false,
            parent_folder: None,
            app_key: None,
            background_refresh,
        }
    }

    pub fn from_config(
        config: &DropboxConfig,
        now: DateTime<Utc>,
        background_refresh: bool,
    ) -> Self {
        Self {
            configured: true,
            state: config.state(now),
            is_connected: config.is_connected,
            token_expiry: config.token_expiry,
            last_refresh_success: config.last_refresh_success,
            last_refresh_attempt: config.last_refresh_attempt,
            consecutive_failures: config.consecutive_failures,
            last_error: config.last_error.clone(),
            needs_reconnection: config.needs_reconnection(),
            parent_folder: Some(config.parent_folder.clone()),
            app_key: Some(config.app_key.clone()),
            background_refresh,
        }
    }
}
