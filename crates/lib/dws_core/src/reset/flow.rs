//! Request → validate code → reset.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::{Rng, rng};
use tracing::{debug, error, info, warn};

use super::store::ResetStore;
use super::{ResetError, ResetPolicy};
use crate::audit::Auditor;
use crate::auth::jwt::TokenMint;
use crate::auth::password::{Hasher, normalize_email, validate_password};
use crate::auth::store::{SessionStore, UserStore};
use crate::clock::Clock;
use crate::id::Id;
use crate::mail::Mailer;
use crate::models::audit::{AuditAction, AuditEvent};
use crate::models::auth::{ClientMeta, ExtraClaims, Purpose};
use crate::models::reset::ResetTicket;

/// Reset codes are six decimal digits.
const CODE_SPACE: u32 = 1_000_000;

fn generate_code() -> String {
    format!("{:06}", rng().random_range(0..CODE_SPACE))
}

fn to_chrono(d: std::time::Duration) -> Result<chrono::Duration, ResetError> {
    chrono::Duration::from_std(d).map_err(|e| ResetError::Internal(format!("duration: {e}")))
}

pub struct ResetFlow {
    users: Arc<dyn UserStore>,
    tickets: Arc<dyn ResetStore>,
    sessions: Arc<dyn SessionStore>,
    mint: Arc<TokenMint>,
    hasher: Hasher,
    mailer: Arc<dyn Mailer>,
    auditor: Auditor,
    clock: Arc<dyn Clock>,
    policy: ResetPolicy,
}

impl ResetFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        users: Arc<dyn UserStore>,
        tickets: Arc<dyn ResetStore>,
        sessions: Arc<dyn SessionStore>,
        mint: Arc<TokenMint>,
        hasher: Hasher,
        mailer: Arc<dyn Mailer>,
        auditor: Auditor,
        clock: Arc<dyn Clock>,
        policy: ResetPolicy,
    ) -> Self {
        Self {
            users,
            tickets,
            sessions,
            mint,
            hasher,
            mailer,
            auditor,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &ResetPolicy {
        &self.policy
    }

    /// Issue a ticket for `email` and mail its code. Returns the ticket
    /// expiry. Mail failures are audited but do not fail the request.
    pub async fn request(
        &self,
        email: &str,
        meta: &ClientMeta,
    ) -> Result<DateTime<Utc>, ResetError> {
        let email = normalize_email(email);
        let now = self.clock.now();

        let Some(user) = self.users.find_by_email(&email).await? else {
            self.audit_rejected(None, meta, "user_not_found", Some(&email))
                .await;
            return Err(ResetError::UserNotFound);
        };
        if !user.is_active {
            self.audit_rejected(Some(user.id), meta, "user_inactive", None)
                .await;
            return Err(ResetError::UserInactive);
        }

        let since = now - to_chrono(self.policy.window)?;
        let by_user = self.tickets.count_since(user.id, since).await?;
        let by_ip = self.tickets.count_since_by_ip(&meta.ip, since).await?;
        if by_user >= self.policy.per_user_cap || by_ip >= self.policy.per_ip_cap {
            debug!(user_id = %user.id, by_user, by_ip, "reset request rate limited");
            self.audit_rejected(Some(user.id), meta, "rate_limited", None)
                .await;
            return Err(ResetError::TooManyRequests);
        }

        let code = generate_code();
        let (signed_token, expires_at) = self.mint.issue(
            &user.id.to_string(),
            Purpose::PasswordReset,
            self.policy.ticket_ttl,
            ExtraClaims::default(),
        )?;

        self.tickets
            .insert(ResetTicket {
                id: Id::new(),
                user_id: user.id,
                signed_token,
                code: code.clone(),
                expires_at,
                used: false,
                ip_address: meta.ip.clone(),
                created_at: now,
            })
            .await?;

        let sent = tokio::time::timeout(
            self.policy.mail_timeout,
            self.mailer
                .send_password_reset(&user.email, &user.full_name(), &code),
        )
        .await;
        let mail_error = match sent {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "mail send timed out after {:?}",
                self.policy.mail_timeout
            )),
        };

        let mut event = AuditEvent::new(AuditAction::PasswordResetRequested)
            .subject(user.id)
            .ip(&meta.ip)
            .user_agent(&meta.user_agent)
            .detail("mail_sent", mail_error.is_none());
        match &mail_error {
            Some(err) => {
                warn!(user_id = %user.id, error = %err, "password reset mail not delivered");
                event = event.detail("mail_error", err.as_str());
            }
            None => info!(user_id = %user.id, "password reset requested"),
        }
        self.auditor.record(event).await;
        Ok(expires_at)
    }

    /// Exchange a code for the ticket's signed token. Does not consume the
    /// ticket.
    pub async fn validate_code(&self, code: &str) -> Result<String, ResetError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ResetError::Invalid);
        }
        let ticket = self
            .tickets
            .find_by_code(code)
            .await?
            .ok_or(ResetError::Invalid)?;
        if !ticket.is_valid(self.clock.now()) {
            return Err(ResetError::Invalid);
        }
        Ok(ticket.signed_token)
    }

    /// Spend the signed token and set a new password. At most one call per
    /// ticket succeeds.
    ///
    /// The ticket is spent before the password is written. If that write or
    /// the session revocation fails, the user has to request a new code.
    pub async fn reset(
        &self,
        signed_token: &str,
        new_password: &str,
        meta: &ClientMeta,
    ) -> Result<(), ResetError> {
        let now = self.clock.now();
        let ticket = self
            .tickets
            .find_by_token(signed_token)
            .await?
            .ok_or(ResetError::Invalid)?;
        if !ticket.is_valid(now) {
            return Err(ResetError::Invalid);
        }

        let claims = self
            .mint
            .verify_purpose(signed_token, Purpose::PasswordReset)?;
        if claims.sub != ticket.user_id.to_string() {
            warn!(ticket_id = %ticket.id, "reset token subject does not match ticket");
            return Err(ResetError::Invalid);
        }

        validate_password(new_password)?;
        let hash = self.hasher.hash(new_password)?;

        // Claim before writing so a concurrent loser never touches the password.
        if !self.tickets.mark_used(ticket.id).await? {
            debug!(ticket_id = %ticket.id, "reset lost the race for the ticket");
            return Err(ResetError::Invalid);
        }
        if let Err(e) = self.users.update_password(ticket.user_id, &hash, now).await {
            error!(
                ticket_id = %ticket.id,
                user_id = %ticket.user_id,
                error = %e,
                "password update failed after the reset ticket was spent"
            );
            return Err(e.into());
        }

        let revoked = if self.policy.revoke_sessions {
            match self.sessions.delete_all_for_user(ticket.user_id).await {
                Ok(n) => n,
                Err(e) => {
                    error!(
                        ticket_id = %ticket.id,
                        user_id = %ticket.user_id,
                        error = %e,
                        "password was reset but existing sessions could not be revoked"
                    );
                    return Err(e.into());
                }
            }
        } else {
            0
        };

        info!(user_id = %ticket.user_id, revoked, "password reset completed");
        self.auditor
            .record(
                AuditEvent::new(AuditAction::PasswordResetCompleted)
                    .subject(ticket.user_id)
                    .ip(&meta.ip)
                    .user_agent(&meta.user_agent)
                    .detail("sessions_revoked", revoked),
            )
            .await;
        Ok(())
    }

    async fn audit_rejected(
        &self,
        user_id: Option<Id>,
        meta: &ClientMeta,
        reason: &str,
        email: Option<&str>,
    ) {
        let mut event = AuditEvent::new(AuditAction::PasswordResetRequested)
            .ip(&meta.ip)
            .user_agent(&meta.user_agent)
            .outcome(false, reason);
        if let Some(id) = user_id {
            event = event.subject(id);
        }
        if let Some(email) = email {
            event = event.detail("email", email);
        }
        self.auditor.record(event).await;
    }
}
