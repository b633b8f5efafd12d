//! Outgoing mail.

pub mod smtp;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::mail::OutgoingMail;
use crate::store::StoreError;

pub const RESET_SUBJECT: &str = "Doctor's Workspace password reset code";

#[derive(Debug, Error)]
pub enum MailError {
    #[error("SMTP is not configured")]
    NotConfigured,

    /// The sealed SMTP password no longer opens; an admin must re-enter it.
    #[error("Stored SMTP credentials are unreadable; re-enter the SMTP password")]
    CredentialsUnreadable,

    #[error("Invalid mail settings: {0}")]
    Invalid(String),

    #[error("Mail send failed: {0}")]
    Send(String),

    #[error("Mail send timed out")]
    Timeout,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Delivers the messages the core emits.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;

    async fn send_password_reset(
        &self,
        to: &str,
        recipient_name: &str,
        code: &str,
    ) -> Result<(), MailError> {
        self.send(password_reset_mail(to, recipient_name, code))
            .await
    }
}

/// Plain-text reset message carrying `code`.
pub fn password_reset_mail(to: &str, recipient_name: &str, code: &str) -> OutgoingMail {
    let greeting = if recipient_name.trim().is_empty() {
        "Hello,".to_string()
    } else {
        format!("Hello {},", recipient_name.trim())
    };
    let body = format!(
        "{greeting}\n\n\
         We received a request to reset your Doctor's Workspace password.\n\n\
         Your reset code is: {code}\n\n\
         The code expires in 15 minutes. If you did not ask for a reset, you can ignore this message.\n"
    );
    OutgoingMail {
        to: to.to_string(),
        recipient_name: recipient_name.to_string(),
        subject: RESET_SUBJECT.to_string(),
        body,
    }
}
