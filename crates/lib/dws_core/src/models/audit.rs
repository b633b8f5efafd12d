//! Audit trail models.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::id::Id;

/// Audited actions. Stored as their dotted string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AuditAction {
    #[serde(rename = "login.success")]
    LoginSuccess,
    #[serde(rename = "login.failed")]
    LoginFailed,
    #[serde(rename = "account.locked")]
    AccountLocked,
    #[serde(rename = "logout")]
    Logout,
    #[serde(rename = "session.refreshed")]
    SessionRefreshed,
    #[serde(rename = "password.changed")]
    PasswordChanged,
    #[serde(rename = "password_reset.requested")]
    PasswordResetRequested,
    #[serde(rename = "password_reset.completed")]
    PasswordResetCompleted,
    #[serde(rename = "user.created")]
    UserCreated,
    #[serde(rename = "dropbox.authorize")]
    DropboxAuthorize,
    #[serde(rename = "dropbox.force_refresh")]
    DropboxForceRefresh,
    #[serde(rename = "dropbox.test_connection")]
    DropboxTestConnection,
    #[serde(rename = "dropbox.delete_configuration")]
    DropboxDeleteConfiguration,
    #[serde(rename = "smtp_config.updated")]
    SmtpConfigUpdated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::LoginSuccess => "login.success",
            AuditAction::LoginFailed => "login.failed",
            AuditAction::AccountLocked => "account.locked",
            AuditAction::Logout => "logout",
            AuditAction::SessionRefreshed => "session.refreshed",
            AuditAction::PasswordChanged => "password.changed",
            AuditAction::PasswordResetRequested => "password_reset.requested",
            AuditAction::PasswordResetCompleted => "password_reset.completed",
            AuditAction::UserCreated => "user.created",
            AuditAction::DropboxAuthorize => "dropbox.authorize",
            AuditAction::DropboxForceRefresh => "dropbox.force_refresh",
            AuditAction::DropboxTestConnection => "dropbox.test_connection",
            AuditAction::DropboxDeleteConfiguration => "dropbox.delete_configuration",
            AuditAction::SmtpConfigUpdated => "smtp_config.updated",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub id: Id,
    /// The user the event is about.
    pub subject_user_id: Option<Id>,
    /// The user who performed the action, when different from the subject.
    pub actor_user_id: Option<Id>,
    pub action: AuditAction,
    pub ip_address: String,
    pub user_agent: String,
    pub details: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Start an event; the timestamp is filled in by the `Auditor`.
    pub fn new(action: AuditAction) -> Self {
        Self {
            id: Id::new(),
            subject_user_id: None,
            actor_user_id: None,
            action,
            ip_address: String::new(),
            user_agent: String::new(),
            details: Map::new(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn subject(mut self, user_id: Id) -> Self {
        self.subject_user_id = Some(user_id);
        self
    }

    pub fn actor(mut self, user_id: Id) -> Self {
        self.actor_user_id = Some(user_id);
        self
    }

    pub fn ip(mut self, ip: &str) -> Self {
        self.ip_address = ip.to_string();
        self
    }

    pub fn user_agent(mut self, ua: &str) -> Self {
        self.user_agent = ua.to_string();
        self
    }

    pub fn detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Shorthand for the `success`/`reason` pair most events carry.
    pub fn outcome(self, success: bool, reason: &str) -> Self {
        self.detail("success", success).detail("reason", reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_action_matches_stored_form() {
        for action in [
            AuditAction::LoginFailed,
            AuditAction::PasswordResetRequested,
            AuditAction::DropboxDeleteConfiguration,
            AuditAction::SmtpConfigUpdated,
        ] {
            let json = serde_json::to_value(action).unwrap();
            assert_eq!(json, Value::String(action.as_str().to_string()));
        }
    }

    #[test]
    fn builder_collects_details() {
        let id = Id::new();
        let event = AuditEvent::new(AuditAction::LoginFailed)
            .subject(id)
            .ip("10.0.0.1")
            .outcome(false, "invalid password")
            .detail("attempts", 2);
        assert_eq!(event.subject_user_id, Some(id));
        assert_eq!(event.details["reason"], "invalid password");
        assert_eq!(event.details["attempts"], 2);
    }
}
