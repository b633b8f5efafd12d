//! Outgoing mail configuration models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;

/// Persisted SMTP relay settings (singleton row). The password is sealed.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SmtpConfig {
    pub host: String,
    pub port: i32,
    pub username: String,
    pub password_sealed: String,
    pub from_email: String,
    pub from_name: String,
    pub updated_by: Option<Id>,
    pub updated_at: DateTime<Utc>,
}

impl SmtpConfig {
    /// Everything required to hand a message to the relay.
    pub fn is_complete(&self) -> bool {
        !self.host.is_empty()
            && self.port > 0
            && !self.username.is_empty()
            && !self.password_sealed.is_empty()
            && !self.from_email.is_empty()
    }
}

/// Password-free view for admin screens.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpStatus {
    pub configured: bool,
    pub is_complete: bool,
    pub host: String,
    pub port: i32,
    pub username: String,
    pub from_email: String,
    pub from_name: String,
    pub has_password: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SmtpStatus {
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            is_complete: false,
            host: String::new(),
            port: 0,
            username: String::new(),
            from_email: String::new(),
            from_name: String::new(),
            has_password: false,
            updated_at: None,
        }
    }
}

impl From<&SmtpConfig> for SmtpStatus {
    fn from(config: &SmtpConfig) -> Self {
        Self {
            configured: true,
            is_complete: config.is_complete(),
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            from_email: config.from_email.clone(),
            from_name: config.from_name.clone(),
            has_password: !config.password_sealed.is_empty(),
            updated_at: Some(config.updated_at),
        }
    }
}

/// Admin input for updating SMTP settings. A `None` password keeps the
/// stored one.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpUpdate {
    pub host: String,
    pub port: i32,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    pub from_email: String,
    #[serde(default)]
    pub from_name: String,
}

/// A message as handed to a `Mailer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub recipient_name: String,
    pub subject: String,
    pub body: String,
}
